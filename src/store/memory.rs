use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::KeyValueStore;
use crate::error::StoreError;

/// Process-local store. Nothing else can write to it, so it never reports
/// external changes.
#[derive(Debug, Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
    let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
      values.remove(*key);
    }
    Ok(())
  }

  fn poll_external_changes(&self) -> Result<Vec<String>, StoreError> {
    Ok(Vec::new())
  }
}
