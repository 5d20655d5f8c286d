//! Core traits and types for the dashboard cache.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// A cached dashboard feature. Each one lives under a fixed storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
  Schedule,
  Tasks,
  Expenses,
  Budget,
}

impl Feature {
  pub const ALL: [Feature; 4] = [Self::Schedule, Self::Tasks, Self::Expenses, Self::Budget];

  pub fn storage_key(self) -> &'static str {
    match self {
      Self::Schedule => "dashboard.schedule",
      Self::Tasks => "dashboard.tasks",
      Self::Expenses => "dashboard.expensesCache",
      Self::Budget => "monthlyBudget",
    }
  }

  pub fn from_storage_key(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|f| f.storage_key() == key)
  }
}

impl fmt::Display for Feature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Schedule => "schedule",
      Self::Tasks => "tasks",
      Self::Expenses => "expenses",
      Self::Budget => "budget",
    };
    f.write_str(name)
  }
}

/// Trait for values that can be cached.
///
/// Missing or unreadable data always loads as `Default`.
pub trait Cacheable: Serialize + DeserializeOwned + Default {
  /// Feature this value is stored for
  const FEATURE: Feature;

  /// Decode a stored value. Lists may override this to skip bad items.
  fn decode(raw: &str) -> serde_json::Result<Self> {
    serde_json::from_str(raw)
  }

  /// Normalize in place before every save.
  fn prepare(&mut self) {}

  /// Repair a freshly loaded value.
  fn sanitize(self) -> Self {
    self
  }
}

/// Records that can be upserted into a cached list.
pub trait MergeKey {
  /// Stable identity used to replace an existing record
  fn merge_key(&self) -> String;
}
