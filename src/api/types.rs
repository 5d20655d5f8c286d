//! Serde types matching the backend's request and response bodies.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Users
// ============================================================================

/// Profile returned by sign-in, registration and `/users/profile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default)]
  pub user_name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub university: Option<String>,
  #[serde(default)]
  pub major: Option<String>,
  #[serde(default)]
  pub year_of_study: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
  pub user_name: &'a str,
  pub password: &'a str,
}

/// Sign-in response. Older backends return only `token`, which is a refresh
/// token.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
  #[serde(default)]
  pub token: Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub access_token: Option<String>,
  #[serde(default, rename = "userDTO")]
  pub user: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
  pub user_name: &'a str,
  pub email: &'a str,
  pub password: &'a str,
  pub re_password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
  pub refresh_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
  #[serde(default)]
  pub access_token: Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub content: Vec<T>,
  pub total_elements: u64,
  pub total_pages: u64,
  pub number: u64,
  pub size: u64,
}

impl<T: DeserializeOwned> Page<T> {
  /// Normalize a response that is either a bare list or a page object.
  /// Anything else becomes an empty page.
  pub fn from_list_or_page(value: Value, page_index: u64, page_size: u64) -> serde_json::Result<Self> {
    match value {
      Value::Array(items) => {
        let content: Vec<T> = serde_json::from_value(Value::Array(items))?;
        Ok(Self {
          total_elements: content.len() as u64,
          content,
          total_pages: 1,
          number: page_index,
          size: page_size,
        })
      }
      Value::Object(mut map) if map.get("content").is_some_and(Value::is_array) => {
        let content: Vec<T> = serde_json::from_value(map.remove("content").unwrap_or_default())?;
        let field = |name: &str| map.get(name).and_then(Value::as_u64);
        Ok(Self {
          total_elements: field("totalElements").unwrap_or(content.len() as u64),
          total_pages: field("totalPages").unwrap_or(1),
          number: field("number").unwrap_or(page_index),
          size: field("size").unwrap_or(page_size),
          content,
        })
      }
      _ => Ok(Self {
        content: Vec::new(),
        total_elements: 0,
        total_pages: 0,
        number: page_index,
        size: page_size,
      }),
    }
  }
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
  Todo,
  InProgress,
  Done,
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
  Low,
  Medium,
  High,
  Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub deadline: Option<String>,
  pub status: TaskStatus,
  pub priority: TaskPriority,
  #[serde(default)]
  pub course_id: Option<String>,
}

/// Body of `POST /tasks/add`. `deadline` is a local `YYYY-MM-DDTHH:mm:ss`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deadline: Option<String>,
  pub status: TaskStatus,
  pub priority: TaskPriority,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub course_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSearch {
  pub page_index: u64,
  pub page_size: u64,
}

// ============================================================================
// Expenses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseCategory {
  Food,
  Study,
  Transport,
  Other,
}

impl ExpenseCategory {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Food => "FOOD",
      Self::Study => "STUDY",
      Self::Transport => "TRANSPORT",
      Self::Other => "OTHER",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDto {
  pub id: String,
  /// The backend serializes `BigDecimal`, sometimes as a string
  #[serde(deserialize_with = "lenient_amount")]
  pub amount: f64,
  pub category: ExpenseCategory,
  #[serde(default)]
  pub description: Option<String>,
  /// `YYYY-MM-DDTHH:mm:ss`
  pub expense_date: String,
  #[serde(default)]
  pub payment_method: Option<String>,
}

/// Body of `POST /expenses/add`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
  pub amount: f64,
  pub category: ExpenseCategory,
  pub description: String,
  pub expense_date: String,
  pub payment_method: String,
}

impl NewExpense {
  /// Build from a `YYYY-MM-DD` date and an `HH:mm` (or `HH:mm:ss`) time.
  pub fn new(
    amount: f64,
    category: ExpenseCategory,
    description: Option<String>,
    date: &str,
    time: &str,
    payment_method: Option<String>,
  ) -> Self {
    let time = match time.len() {
      0 => "00:00:00".to_string(),
      5 => format!("{time}:00"),
      _ => time.to_string(),
    };
    Self {
      amount,
      category,
      description: description.unwrap_or_default(),
      expense_date: format!("{date}T{time}"),
      payment_method: payment_method.unwrap_or_else(|| "CASH".to_string()),
    }
  }
}

/// Filters are sent as explicit `null`s when unset.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSearch {
  pub page_index: u64,
  pub page_size: u64,
  pub category: Option<ExpenseCategory>,
  pub min_amount: Option<f64>,
  pub max_amount: Option<f64>,
  pub description: Option<String>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub payment_method: Option<String>,
}

// ============================================================================
// Courses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDto {
  pub id: String,
  pub name_course: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub room: Option<String>,
  /// Weekday label, e.g. "Thứ 2"
  pub day_week: String,
  /// `YYYY-MM-DDTHH:mm:ss`
  #[serde(default)]
  pub time_study: Option<String>,
  #[serde(default)]
  pub color: Option<String>,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
  pub message: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatResponse {
  #[serde(default)]
  pub reply: Option<String>,
  #[serde(default)]
  pub response: Option<String>,
}

/// Accept a JSON number or a numeric string. Anything that is not a finite
/// number reads as 0.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Amount {
    Number(f64),
    Text(String),
  }

  let amount = match Amount::deserialize(deserializer)? {
    Amount::Number(n) => n,
    Amount::Text(s) => s.trim().parse().unwrap_or(0.0),
  };
  Ok(if amount.is_finite() { amount } else { 0.0 })
}
