//! Cache layer between the sync operations and the dashboard.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::records::{ExpenseSummary, MonthlyBudget};
use super::traits::{Cacheable, MergeKey};
use crate::event::{AppEvent, EventBus};
use crate::store::KeyValueStore;

/// Storage key of the task id -> category map
pub const TASK_CATEGORIES_KEY: &str = "task_ui_categories_v1";

/// Read-through cache for the dashboard.
///
/// Every save emits [`AppEvent::CacheChanged`]. Failures are logged and
/// swallowed: loads fall back to the default value, saves are dropped.
#[derive(Clone)]
pub struct DashboardCache {
  store: Arc<dyn KeyValueStore>,
  bus: EventBus,
}

impl DashboardCache {
  pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
    Self { store, bus }
  }

  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  /// Persist `value` under its feature key and notify subscribers.
  pub fn save<T: Cacheable>(&self, mut value: T) {
    value.prepare();
    let key = T::FEATURE.storage_key();

    let raw = match serde_json::to_string(&value) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(feature = %T::FEATURE, error = %e, "failed to serialize cache entry");
        return;
      }
    };
    if let Err(e) = self.store.set(key, &raw) {
      warn!(feature = %T::FEATURE, error = %e, "failed to write cache entry");
      return;
    }

    debug!(feature = %T::FEATURE, bytes = raw.len(), "cache saved");
    self.bus.publish(AppEvent::CacheChanged(T::FEATURE));
  }

  /// Load a feature's value; missing or malformed data gives the default.
  pub fn load<T: Cacheable>(&self) -> T {
    let key = T::FEATURE.storage_key();
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return T::default(),
      Err(e) => {
        warn!(feature = %T::FEATURE, error = %e, "failed to read cache entry");
        return T::default();
      }
    };

    match T::decode(&raw) {
      Ok(value) => value.sanitize(),
      Err(e) => {
        warn!(feature = %T::FEATURE, error = %e, "discarding malformed cache entry");
        T::default()
      }
    }
  }

  /// Upsert expenses by identity, then save.
  pub fn merge_expenses<I>(&self, incoming: I)
  where
    I: IntoIterator<Item = ExpenseSummary>,
  {
    let mut cached: Vec<ExpenseSummary> = self.load();
    let mut index: HashMap<String, usize> = cached
      .iter()
      .enumerate()
      .map(|(i, e)| (e.merge_key(), i))
      .collect();

    let mut changed = false;
    for expense in incoming {
      changed = true;
      let key = expense.merge_key();
      match index.get(&key).copied() {
        Some(i) => cached[i] = expense,
        None => {
          index.insert(key, cached.len());
          cached.push(expense);
        }
      }
    }

    if changed {
      self.save(cached);
    }
  }

  /// Remove a cached expense by id. Unknown ids are a no-op.
  pub fn remove_expense(&self, id: &str) {
    let mut cached: Vec<ExpenseSummary> = self.load();
    let before = cached.len();
    cached.retain(|e| e.id.as_deref() != Some(id));
    if cached.len() != before {
      self.save(cached);
    }
  }

  pub fn budget(&self) -> MonthlyBudget {
    self.load()
  }

  pub fn set_budget(&self, budget: MonthlyBudget) {
    self.save(budget);
  }

  /// Locally assigned task categories, by task id.
  pub fn task_categories(&self) -> HashMap<String, String> {
    match self.store.get(TASK_CATEGORIES_KEY) {
      Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "discarding malformed task categories");
        HashMap::new()
      }),
      Ok(None) => HashMap::new(),
      Err(e) => {
        warn!(error = %e, "failed to read task categories");
        HashMap::new()
      }
    }
  }

  pub fn set_task_category(&self, task_id: &str, category: &str) {
    let mut categories = self.task_categories();
    categories.insert(task_id.to_string(), category.to_string());
    self.write_task_categories(&categories);
  }

  pub fn remove_task_category(&self, task_id: &str) {
    let mut categories = self.task_categories();
    if categories.remove(task_id).is_some() {
      self.write_task_categories(&categories);
    }
  }

  fn write_task_categories(&self, categories: &HashMap<String, String>) {
    let result = serde_json::to_string(categories)
      .map_err(|e| e.to_string())
      .and_then(|raw| {
        self
          .store
          .set(TASK_CATEGORIES_KEY, &raw)
          .map_err(|e| e.to_string())
      });
    if let Err(e) = result {
      warn!(error = %e, "failed to write task categories");
    }
  }
}
