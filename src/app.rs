use chrono::{Datelike, Local};
use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::commands::{parse_deadline, parse_month, Command};
use student_life::api::types::{NewExpense, NewTask, TaskStatus};
use student_life::api::{ApiClient, BootOutcome, Registration};
use student_life::cache::{DashboardCache, MonthlyBudget, ScheduleEntry};
use student_life::config::Config;
use student_life::dashboard::{format_amount, DashboardWatcher, Overview, Reload};
use student_life::error::ClientError;
use student_life::event::{spawn_storage_watcher, EventBus};
use student_life::session::TokenStore;
use student_life::store::{KeyValueStore, SqliteStore};
use student_life::sync::{local_today, SyncedClient};

/// Wires storage, session, client and cache together and runs one command.
pub struct App {
  config: Config,
  store: Arc<dyn KeyValueStore>,
  client: SyncedClient,
}

impl App {
  pub fn new(config: Config, db_path: &Path) -> Result<Self> {
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
    let bus = EventBus::default();

    let tokens = TokenStore::new(Arc::clone(&store), bus.clone());
    let api = ApiClient::new(&config.api, tokens)?;
    let cache = DashboardCache::new(Arc::clone(&store), bus);

    Ok(Self {
      config,
      store,
      client: SyncedClient::new(api, cache),
    })
  }

  fn api(&self) -> &ApiClient {
    self.client.api()
  }

  fn cache(&self) -> &DashboardCache {
    self.client.cache()
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    // Nothing protected runs before the boot refresh settles
    let boot = self.api().refresher().ensure_auth_on_boot().await;
    debug!(?boot, "session checked");
    if boot == BootOutcome::SignedOut {
      eprintln!("Your session has expired. Please sign in again.");
    }

    if command.requires_session() && self.api().tokens().access_token().is_none() {
      return Err(eyre!(
        "Not signed in. Run `studentlife login --user <name>` first."
      ));
    }

    match command {
      Command::Login { user } => self.login(&user).await,
      Command::Register { user, email } => self.register(user, email).await,
      Command::Logout => {
        self.api().logout();
        println!("Signed out.");
        Ok(())
      }
      Command::Profile => self.profile().await,
      Command::Schedule => self.schedule().await,
      Command::Tasks => self.tasks().await,
      Command::AddTask {
        title,
        deadline,
        priority,
        category,
        description,
      } => {
        let task = NewTask {
          title,
          description,
          deadline: deadline.as_deref().map(parse_deadline).transpose()?,
          status: TaskStatus::Todo,
          priority: priority.into(),
          course_id: None,
        };
        let saved = self.client.add_task(&task, category.as_deref()).await?;
        println!("Added task {} ({})", saved.title, saved.id);
        Ok(())
      }
      Command::DeleteTask { id } => {
        self.client.delete_task(&id).await?;
        println!("Deleted task {id}");
        Ok(())
      }
      Command::Categorize { id, category } => {
        self.client.set_task_category(&id, &category);
        println!("Task {id} is now in {category}");
        Ok(())
      }
      Command::Expenses { month } => self.expenses(month.as_deref()).await,
      Command::AddExpense {
        amount,
        category,
        date,
        time,
        description,
        payment_method,
      } => {
        if !amount.is_finite() || amount <= 0.0 {
          return Err(eyre!("Amount must be positive"));
        }
        let now = Local::now();
        let date = date.unwrap_or_else(|| now.format("%Y-%m-%d").to_string());
        let time = time.unwrap_or_else(|| now.format("%H:%M").to_string());
        let expense = NewExpense::new(
          amount,
          category.into(),
          description,
          &date,
          &time,
          payment_method,
        );
        let saved = self.client.add_expense(&expense).await?;
        println!(
          "Added {} for {} ({})",
          format_amount(saved.amount),
          saved.category.as_str(),
          saved.id
        );
        Ok(())
      }
      Command::DeleteExpense { id } => {
        self.client.delete_expense(&id).await?;
        println!("Deleted expense {id}");
        Ok(())
      }
      Command::Budget { amount } => {
        if let Some(amount) = amount {
          let budget =
            MonthlyBudget::new(amount).ok_or_else(|| eyre!("Budget must be a non-negative amount"))?;
          self.cache().set_budget(budget);
        }
        println!("Monthly budget: {}", format_amount(self.cache().budget().amount()));
        Ok(())
      }
      Command::Dashboard { sync, watch } => {
        if sync {
          self.sync_all().await?;
        }
        if watch {
          self.watch_dashboard().await
        } else {
          print!("{}", Overview::load(self.cache(), Local::now().date_naive()));
          Ok(())
        }
      }
      Command::Chat { message } => {
        let reply = self.api().chat(&message.join(" ")).await?;
        println!("{reply}");
        Ok(())
      }
    }
  }

  async fn login(&self, user: &str) -> Result<()> {
    let password = Config::get_password()?;
    let session = self.api().login(user, &password).await?;
    let name = session
      .user
      .and_then(|u| u.user_name)
      .unwrap_or_else(|| user.to_string());
    println!("Signed in as {name}.");
    Ok(())
  }

  async fn register(&self, user_name: String, email: String) -> Result<()> {
    let password = Config::get_password()?;
    let form = Registration {
      user_name,
      email,
      re_password: password.clone(),
      password,
    };
    self.api().register(&form).await?;
    println!("Account created. Sign in with `studentlife login --user {}`.", form.user_name.trim());
    Ok(())
  }

  async fn profile(&self) -> Result<()> {
    let profile = self.api().profile().await?;
    let field = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    println!("User:       {}", field(profile.user_name));
    println!("Email:      {}", field(profile.email));
    println!("University: {}", field(profile.university));
    println!("Major:      {}", field(profile.major));
    println!(
      "Year:       {}",
      field(profile.year_of_study.map(|y| y.to_string()))
    );
    Ok(())
  }

  async fn schedule(&self) -> Result<()> {
    let (weekday, _, _) = local_today();
    let schedule = self.client.sync_schedule(weekday).await?;
    print_schedule(&schedule);
    Ok(())
  }

  async fn tasks(&self) -> Result<()> {
    let tasks = self.client.sync_tasks().await?;
    if tasks.is_empty() {
      println!("No tasks.");
    }
    for task in tasks {
      println!(
        "[{:<5}] {:<32} due {:<19}  {:<8} {:<6}  {}",
        task.status.as_deref().unwrap_or("todo"),
        task.title,
        task.deadline,
        task.category.as_deref().unwrap_or("-"),
        task.priority.as_deref().unwrap_or("-"),
        task.id.as_deref().unwrap_or("-"),
      );
    }
    Ok(())
  }

  async fn expenses(&self, month: Option<&str>) -> Result<()> {
    let (year, month) = match month {
      Some(input) => parse_month(input)?,
      None => {
        let today = Local::now();
        (today.year(), today.month())
      }
    };

    let mut expenses = self.client.sync_expenses(year, month).await?;
    expenses.sort_by(|a, b| b.expense_date.cmp(&a.expense_date));

    let mut total = 0.0;
    for expense in &expenses {
      total += expense.amount;
      println!(
        "{}  {:>14}  {:<9} {:<24}  {}",
        expense.expense_date.replace('T', " "),
        format_amount(expense.amount),
        expense.category.as_str(),
        expense.description.as_deref().unwrap_or(""),
        expense.id,
      );
    }
    println!("Total for {year}-{month:02}: {}", format_amount(total));
    Ok(())
  }

  /// Refresh every cached feature. An expired session stops the run; other
  /// failures leave that feature's cache as it was.
  async fn sync_all(&self) -> Result<()> {
    let (weekday, year, month) = local_today();

    let results = [
      ("schedule", self.client.sync_schedule(weekday).await.map(|_| ())),
      ("tasks", self.client.sync_tasks().await.map(|_| ())),
      ("expenses", self.client.sync_expenses(year, month).await.map(|_| ())),
    ];

    for (feature, result) in results {
      match result {
        Ok(()) => info!(feature, "synced"),
        Err(ClientError::SessionExpired) => return Err(ClientError::SessionExpired.into()),
        Err(e) => {
          warn!(feature, error = %e, "sync failed, showing cached data");
          eprintln!("Could not refresh {feature}: {e}");
        }
      }
    }
    Ok(())
  }

  async fn watch_dashboard(&self) -> Result<()> {
    let bus = self.cache().bus().clone();
    let mut watcher = DashboardWatcher::new(&bus);
    let poller = spawn_storage_watcher(
      Arc::clone(&self.store),
      bus,
      Duration::from_millis(self.config.dashboard.watch_interval_ms),
    );

    self.render_dashboard();
    loop {
      tokio::select! {
        reload = watcher.changed() => match reload {
          Some(Reload::SignedOut) => {
            println!("\nSigned out. Please sign in again.");
            break;
          }
          Some(reason) => {
            debug!(?reason, "reloading dashboard");
            self.render_dashboard();
          }
          None => break,
        },
        _ = tokio::signal::ctrl_c() => break,
      }
    }

    poller.abort();
    Ok(())
  }

  fn render_dashboard(&self) {
    // Clear the screen and home the cursor
    print!("\x1B[2J\x1B[H");
    print!("{}", Overview::load(self.cache(), Local::now().date_naive()));
  }
}

fn print_schedule(schedule: &[ScheduleEntry]) {
  if schedule.is_empty() {
    println!("No classes today.");
  }
  for entry in schedule {
    println!("{}  {}  [{}]", entry.time, entry.subject, entry.room);
  }
}
