//! Records kept in the dashboard cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::traits::{Cacheable, Feature, MergeKey};
use crate::api::types::{lenient_amount, ExpenseDto};

/// Expenses kept in the cache, most recent first
pub const MAX_CACHED_EXPENSES: usize = 100;

/// Budget used when none is stored or the stored one is unusable
pub const DEFAULT_MONTHLY_BUDGET: f64 = 5_000_000.0;

/// One class on today's schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleEntry {
  /// `HH:mm`
  pub time: String,
  pub subject: String,
  pub room: String,
}

/// Task as shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSummary {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub title: String,
  /// `YYYY-MM-DDTHH:mm:ss`, empty when the task has none
  pub deadline: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  /// low, medium or high
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<String>,
  /// todo, doing or done
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub done: Option<bool>,
}

impl TaskSummary {
  pub fn is_done(&self) -> bool {
    self.done.unwrap_or(false) || self.status.as_deref() == Some("done")
  }
}

/// Expense as kept for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSummary {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(deserialize_with = "lenient_amount")]
  pub amount: f64,
  /// `YYYY-MM-DD`
  pub date: String,
  /// `HH:mm`
  #[serde(default)]
  pub time: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub payment_method: Option<String>,
}

impl ExpenseSummary {
  /// `date` + "T" + `time`, used for recency ordering.
  pub fn timestamp(&self) -> String {
    format!("{}T{}", self.date, self.time.as_deref().unwrap_or("00:00"))
  }

  /// Read one stored item, tolerating older and foreign shapes.
  ///
  /// The amount comes from `amount`, `total` or `value` and must be finite.
  /// Without `date` the first ten characters of `expenseDate` are used.
  /// Items without a usable amount or date are rejected.
  pub fn from_cached(item: &Value) -> Option<Self> {
    let obj = item.as_object()?;
    let amount = first_present(obj, &["amount", "total", "value"]).and_then(finite_amount)?;
    let date = text(obj, "date")
      .filter(|d| !d.is_empty())
      .or_else(|| {
        obj
          .get("expenseDate")
          .and_then(Value::as_str)
          .map(|d| d.chars().take(10).collect())
      })
      .filter(|d| !d.is_empty())?;

    Some(Self {
      id: first_present(obj, &["id"]).and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
      }),
      amount,
      date,
      time: text(obj, "time"),
      category: first_present(obj, &["category", "categoryName", "type"]).map(|c| match c {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      }),
      description: text(obj, "description"),
      payment_method: text(obj, "paymentMethod"),
    })
  }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
  keys
    .iter()
    .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
  obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn finite_amount(value: &Value) -> Option<f64> {
  let amount = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse().ok()?,
    _ => return None,
  };
  amount.is_finite().then_some(amount)
}

impl MergeKey for ExpenseSummary {
  fn merge_key(&self) -> String {
    match &self.id {
      Some(id) => id.clone(),
      None => format!(
        "{}-{}-{}-{}",
        self.date,
        self.time.as_deref().unwrap_or_default(),
        self.amount,
        self.category.as_deref().unwrap_or_default()
      ),
    }
  }
}

impl From<&ExpenseDto> for ExpenseSummary {
  fn from(dto: &ExpenseDto) -> Self {
    let (date, time) = dto
      .expense_date
      .split_once('T')
      .unwrap_or((dto.expense_date.as_str(), "00:00:00"));
    let date = if date.is_empty() {
      chrono::Local::now().format("%Y-%m-%d").to_string()
    } else {
      date.to_string()
    };

    Self {
      id: Some(dto.id.clone()),
      amount: dto.amount,
      date,
      time: Some(time.chars().take(5).collect()),
      category: Some(dto.category.as_str().to_string()),
      description: Some(dto.description.clone().unwrap_or_default()),
      payment_method: Some(
        dto
          .payment_method
          .clone()
          .unwrap_or_else(|| "CASH".to_string()),
      ),
    }
  }
}

/// Monthly spending budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthlyBudget(pub f64);

impl MonthlyBudget {
  /// A budget must be a finite, non-negative amount.
  pub fn new(amount: f64) -> Option<Self> {
    (amount.is_finite() && amount >= 0.0).then_some(Self(amount))
  }

  pub fn amount(self) -> f64 {
    self.0
  }
}

impl Default for MonthlyBudget {
  fn default() -> Self {
    Self(DEFAULT_MONTHLY_BUDGET)
  }
}

impl Cacheable for Vec<ScheduleEntry> {
  const FEATURE: Feature = Feature::Schedule;
}

impl Cacheable for Vec<TaskSummary> {
  const FEATURE: Feature = Feature::Tasks;
}

impl Cacheable for Vec<ExpenseSummary> {
  const FEATURE: Feature = Feature::Expenses;

  fn decode(raw: &str) -> serde_json::Result<Self> {
    let items: Vec<Value> = serde_json::from_str(raw)?;
    let total = items.len();
    let expenses: Vec<ExpenseSummary> = items.iter().filter_map(ExpenseSummary::from_cached).collect();
    if expenses.len() < total {
      debug!(skipped = total - expenses.len(), "skipping unreadable cached expenses");
    }
    Ok(expenses)
  }

  fn prepare(&mut self) {
    // Non-finite amounts would be written as null
    self.retain(|e| e.amount.is_finite());
    // Stable: equal timestamps keep their relative order
    self.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    self.truncate(MAX_CACHED_EXPENSES);
  }
}

impl Cacheable for MonthlyBudget {
  const FEATURE: Feature = Feature::Budget;

  fn sanitize(self) -> Self {
    Self::new(self.0).unwrap_or_default()
  }
}
