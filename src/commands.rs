//! Command-line subcommands.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use student_life::api::types::{ExpenseCategory, TaskPriority};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// Sign in (password from STUDENT_LIFE_PASSWORD)
  Login {
    #[arg(short, long)]
    user: String,
  },
  /// Create an account (password from STUDENT_LIFE_PASSWORD)
  Register {
    #[arg(short, long)]
    user: String,
    #[arg(short, long)]
    email: String,
  },
  /// Sign out and forget the stored tokens
  Logout,
  /// Show the signed-in user's profile
  Profile,
  /// Sync and show today's classes
  #[command(alias = "s")]
  Schedule,
  /// Sync and list tasks
  #[command(alias = "t")]
  Tasks,
  /// Create a task
  AddTask {
    title: String,
    /// "YYYY-MM-DD HH:MM"
    #[arg(short, long)]
    deadline: Option<String>,
    #[arg(short, long, value_enum, default_value_t = PriorityArg::Medium)]
    priority: PriorityArg,
    #[arg(short, long)]
    category: Option<String>,
    #[arg(long)]
    description: Option<String>,
  },
  /// Delete a task
  DeleteTask { id: String },
  /// Assign a local category to a task
  Categorize { id: String, category: String },
  /// Sync and list this month's expenses
  #[command(alias = "e")]
  Expenses {
    /// "YYYY-MM", defaults to the current month
    #[arg(short, long)]
    month: Option<String>,
  },
  /// Record an expense
  AddExpense {
    amount: f64,
    #[arg(short, long, value_enum, default_value_t = CategoryArg::Other)]
    category: CategoryArg,
    /// "YYYY-MM-DD", defaults to today
    #[arg(long)]
    date: Option<String>,
    /// "HH:MM", defaults to now
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    payment_method: Option<String>,
  },
  /// Delete an expense
  DeleteExpense { id: String },
  /// Show or set the monthly budget
  Budget { amount: Option<f64> },
  /// Show the dashboard from the local cache
  #[command(alias = "d")]
  Dashboard {
    /// Refresh every feature from the backend first
    #[arg(long)]
    sync: bool,
    /// Keep running and re-render on every change
    #[arg(short, long)]
    watch: bool,
  },
  /// Ask the study assistant
  Chat {
    #[arg(required = true, num_args = 1..)]
    message: Vec<String>,
  },
}

impl Command {
  /// Commands that need a signed-in session.
  pub fn requires_session(&self) -> bool {
    !matches!(
      self,
      Self::Login { .. } | Self::Register { .. } | Self::Logout | Self::Budget { .. }
    ) && !matches!(self, Self::Dashboard { sync: false, .. })
  }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryArg {
  Food,
  Study,
  Transport,
  Other,
}

impl From<CategoryArg> for ExpenseCategory {
  fn from(arg: CategoryArg) -> Self {
    match arg {
      CategoryArg::Food => Self::Food,
      CategoryArg::Study => Self::Study,
      CategoryArg::Transport => Self::Transport,
      CategoryArg::Other => Self::Other,
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityArg {
  Low,
  Medium,
  High,
  Urgent,
}

impl From<PriorityArg> for TaskPriority {
  fn from(arg: PriorityArg) -> Self {
    match arg {
      PriorityArg::Low => Self::Low,
      PriorityArg::Medium => Self::Medium,
      PriorityArg::High => Self::High,
      PriorityArg::Urgent => Self::Urgent,
    }
  }
}

/// Parse "YYYY-MM".
pub fn parse_month(input: &str) -> Result<(i32, u32)> {
  let (year, month) = input
    .trim()
    .split_once('-')
    .ok_or_else(|| eyre!("Expected YYYY-MM, got {input:?}"))?;
  let year: i32 = year.parse().map_err(|_| eyre!("Invalid year in {input:?}"))?;
  let month: u32 = month.parse().map_err(|_| eyre!("Invalid month in {input:?}"))?;
  if !(1..=12).contains(&month) {
    return Err(eyre!("Month must be 1-12, got {month}"));
  }
  Ok((year, month))
}

/// Parse "YYYY-MM-DD HH:MM" (or with a `T`) into a backend timestamp. A bare
/// date means the end of that day.
pub fn parse_deadline(input: &str) -> Result<String> {
  let normalized = input.trim().replacen('T', " ", 1);
  let parsed = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
    .or_else(|| {
      NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 0))
    })
    .ok_or_else(|| eyre!("Expected a deadline like 2025-10-08 23:59, got {input:?}"))?;
  Ok(parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
}
