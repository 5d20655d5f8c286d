//! Dashboard overview built purely from the local cache.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::cache::{DashboardCache, ExpenseSummary, Feature, MonthlyBudget, ScheduleEntry, TaskSummary};
use crate::event::{AppEvent, EventBus};

const UPCOMING_TASKS: usize = 5;
const TOP_CATEGORIES: usize = 3;

/// Everything the dashboard shows, for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
  pub today: NaiveDate,
  /// Today's classes by start time
  pub schedule: Vec<ScheduleEntry>,
  /// Nearest deadlines first
  pub upcoming_tasks: Vec<TaskSummary>,
  pub month_expenses: Vec<ExpenseSummary>,
  pub month_total: f64,
  pub budget: MonthlyBudget,
  /// Upper-cased category and amount, biggest first
  pub top_categories: Vec<(String, f64)>,
}

impl Overview {
  pub fn load(cache: &DashboardCache, today: NaiveDate) -> Self {
    let mut schedule: Vec<ScheduleEntry> = cache.load();
    schedule.sort_by(|a, b| a.time.cmp(&b.time));

    let mut upcoming_tasks: Vec<TaskSummary> = cache
      .load::<Vec<TaskSummary>>()
      .into_iter()
      .filter(|t| !t.title.is_empty() && !t.deadline.is_empty())
      .collect();
    upcoming_tasks.sort_by(|a, b| a.deadline.cmp(&b.deadline));
    upcoming_tasks.truncate(UPCOMING_TASKS);

    let month_expenses: Vec<ExpenseSummary> = cache
      .load::<Vec<ExpenseSummary>>()
      .into_iter()
      .filter(|e| same_month(&e.date, today))
      .collect();
    let month_total = month_expenses
      .iter()
      .fold(0.0, |total, e| total + finite(e.amount));
    let top_categories = top_categories(&month_expenses, TOP_CATEGORIES);

    Self {
      today,
      schedule,
      upcoming_tasks,
      month_expenses,
      month_total,
      budget: cache.budget(),
      top_categories,
    }
  }

  /// Budget minus this month's spending; negative when overspent.
  pub fn remaining_budget(&self) -> f64 {
    self.budget.amount() - self.month_total
  }

  /// Share of the budget spent, rounded to whole percent.
  pub fn budget_usage_percent(&self) -> Option<u32> {
    let budget = self.budget.amount();
    (budget > 0.0).then(|| (self.month_total / budget * 100.0).round().max(0.0) as u32)
  }
}

fn finite(amount: f64) -> f64 {
  if amount.is_finite() {
    amount
  } else {
    0.0
  }
}

fn same_month(date: &str, today: NaiveDate) -> bool {
  date
    .get(..10)
    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    .is_some_and(|d| d.year() == today.year() && d.month() == today.month())
}

fn top_categories(expenses: &[ExpenseSummary], limit: usize) -> Vec<(String, f64)> {
  let mut totals: Vec<(String, f64)> = Vec::new();
  for expense in expenses {
    let category = expense
      .category
      .as_deref()
      .filter(|c| !c.is_empty())
      .unwrap_or("OTHER")
      .to_uppercase();
    match totals.iter_mut().find(|(name, _)| *name == category) {
      Some((_, total)) => *total += finite(expense.amount),
      None => totals.push((category, finite(expense.amount))),
    }
  }
  totals.sort_by(|a, b| b.1.total_cmp(&a.1));
  totals.truncate(limit);
  totals
}

/// Group digits in thousands: 1234567 -> "1.234.567".
pub fn format_amount(amount: f64) -> String {
  let rounded = amount.round() as i64;
  let digits = rounded.unsigned_abs().to_string();
  let mut out = String::new();
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push('.');
    }
    out.push(ch);
  }
  if rounded < 0 {
    out.insert(0, '-');
  }
  format!("{out} ₫")
}

impl fmt::Display for Overview {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Dashboard for {}", self.today.format("%Y-%m-%d"))?;

    writeln!(f, "\nToday's classes")?;
    if self.schedule.is_empty() {
      writeln!(f, "  (none)")?;
    }
    for entry in &self.schedule {
      writeln!(f, "  {}  {}  [{}]", entry.time, entry.subject, entry.room)?;
    }

    writeln!(f, "\nUpcoming tasks")?;
    if self.upcoming_tasks.is_empty() {
      writeln!(f, "  (none)")?;
    }
    for task in &self.upcoming_tasks {
      let mark = if task.is_done() { "x" } else { " " };
      let deadline = task.deadline.replace('T', " ");
      writeln!(f, "  [{mark}] {}  due {}", task.title, deadline.get(..16).unwrap_or(deadline.as_str()))?;
    }

    writeln!(f, "\nThis month")?;
    writeln!(f, "  Spent:     {}", format_amount(self.month_total))?;
    writeln!(f, "  Budget:    {}", format_amount(self.budget.amount()))?;
    write!(f, "  Remaining: {}", format_amount(self.remaining_budget()))?;
    match self.budget_usage_percent() {
      Some(pct) => writeln!(f, " ({pct}% used)")?,
      None => writeln!(f)?,
    }
    for (category, total) in &self.top_categories {
      writeln!(f, "  {category:<10} {}", format_amount(*total))?;
    }
    Ok(())
  }
}

/// Why the dashboard has to be reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
  /// This instance rewrote a feature
  Cache(Feature),
  /// Another process rewrote a feature
  Storage(Feature),
  /// Events were missed; reload everything
  Lagged,
  /// The session ended
  SignedOut,
}

/// Turns bus traffic into dashboard reloads.
pub struct DashboardWatcher {
  rx: broadcast::Receiver<AppEvent>,
}

impl DashboardWatcher {
  pub fn new(bus: &EventBus) -> Self {
    Self { rx: bus.subscribe() }
  }

  /// Wait for the next event that affects the dashboard. `None` once the bus
  /// is gone.
  pub async fn changed(&mut self) -> Option<Reload> {
    loop {
      let reload = match self.rx.recv().await {
        Ok(AppEvent::CacheChanged(feature)) => Reload::Cache(feature),
        Ok(AppEvent::StorageChanged { key }) => match Feature::from_storage_key(&key) {
          Some(feature) => Reload::Storage(feature),
          None => {
            debug!(%key, "ignoring change to unwatched key");
            continue;
          }
        },
        Ok(AppEvent::SignInRequired { .. }) => Reload::SignedOut,
        Err(RecvError::Lagged(missed)) => {
          debug!(missed, "dashboard watcher lagged");
          Reload::Lagged
        }
        Err(RecvError::Closed) => return None,
      };
      return Some(reload);
    }
  }
}
