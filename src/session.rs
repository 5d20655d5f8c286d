//! The process-wide session: access token, refresh token and cached profile.
//!
//! Feature code goes through [`TokenStore`] rather than reading the raw keys.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::UserProfile;
use crate::error::StoreError;
use crate::event::{AppEvent, EventBus};
use crate::store::KeyValueStore;

/// Logical session entries and their storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
  AccessToken,
  RefreshToken,
  User,
}

impl SessionKey {
  pub const ALL: [SessionKey; 3] = [Self::AccessToken, Self::RefreshToken, Self::User];

  pub fn storage_key(self) -> &'static str {
    match self {
      Self::AccessToken => "accessToken",
      Self::RefreshToken => "refreshToken",
      Self::User => "user",
    }
  }
}

/// Snapshot of the stored session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
  pub access_token: Option<String>,
  pub refresh_token: Option<String>,
  pub user: Option<UserProfile>,
}

/// Token store over the durable key/value store.
#[derive(Clone)]
pub struct TokenStore {
  store: Arc<dyn KeyValueStore>,
  bus: EventBus,
}

impl TokenStore {
  pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
    Self { store, bus }
  }

  /// Read an entry. Empty values and storage failures read as absent.
  pub fn get(&self, key: SessionKey) -> Option<String> {
    match self.store.get(key.storage_key()) {
      Ok(value) => value.filter(|v| !v.is_empty()),
      Err(e) => {
        warn!(key = key.storage_key(), error = %e, "failed to read session entry");
        None
      }
    }
  }

  pub fn set(&self, key: SessionKey, value: &str) -> Result<(), StoreError> {
    self.store.set(key.storage_key(), value)
  }

  pub fn access_token(&self) -> Option<String> {
    self.get(SessionKey::AccessToken)
  }

  pub fn refresh_token(&self) -> Option<String> {
    self.get(SessionKey::RefreshToken)
  }

  /// Cached profile; unparsable JSON reads as absent.
  pub fn user(&self) -> Option<UserProfile> {
    let raw = self.get(SessionKey::User)?;
    serde_json::from_str(&raw)
      .map_err(|e| warn!(error = %e, "discarding malformed cached profile"))
      .ok()
  }

  pub fn set_user(&self, user: &UserProfile) -> Result<(), StoreError> {
    // Serializing a plain struct of strings cannot fail
    let raw = serde_json::to_string(user).unwrap_or_default();
    self.set(SessionKey::User, &raw)
  }

  pub fn snapshot(&self) -> Session {
    Session {
      access_token: self.access_token(),
      refresh_token: self.refresh_token(),
      user: self.user(),
    }
  }

  /// Store the credentials of a freshly signed-in session.
  pub fn start(
    &self,
    access_token: &str,
    refresh_token: &str,
    user: Option<&UserProfile>,
  ) -> Result<(), StoreError> {
    self.set(SessionKey::RefreshToken, refresh_token)?;
    self.set(SessionKey::AccessToken, access_token)?;
    if let Some(user) = user {
      self.set_user(user)?;
    }
    info!("session started");
    Ok(())
  }

  /// Remove all three entries in one transaction, then send the user to
  /// sign-in.
  pub fn clear(&self, reason: &str) {
    let keys = SessionKey::ALL.map(SessionKey::storage_key);
    if let Err(e) = self.store.remove_all(&keys) {
      warn!(error = %e, "failed to clear session");
    }
    info!(reason, "session cleared");
    self.bus.publish(AppEvent::SignInRequired {
      reason: reason.to_string(),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn token_store() -> (TokenStore, EventBus) {
    let bus = EventBus::default();
    (TokenStore::new(Arc::new(MemoryStore::new()), bus.clone()), bus)
  }

  #[test]
  fn test_empty_values_read_as_absent() {
    let (tokens, _) = token_store();
    tokens.set(SessionKey::AccessToken, "").unwrap();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();

    assert_eq!(tokens.access_token(), None);
    assert_eq!(tokens.refresh_token().as_deref(), Some("rt"));
  }

  #[test]
  fn test_start_and_snapshot() {
    let (tokens, _) = token_store();
    let user = UserProfile {
      user_name: Some("linh".to_string()),
      email: Some("linh@example.com".to_string()),
      ..Default::default()
    };

    tokens.start("at", "rt", Some(&user)).unwrap();

    let session = tokens.snapshot();
    assert_eq!(session.access_token.as_deref(), Some("at"));
    assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    assert_eq!(session.user, Some(user));
  }

  #[test]
  fn test_malformed_profile_is_absent() {
    let (tokens, _) = token_store();
    tokens.set(SessionKey::User, "{not json").unwrap();
    assert_eq!(tokens.user(), None);
  }

  #[tokio::test]
  async fn test_clear_removes_everything_and_requests_sign_in() {
    let (tokens, bus) = token_store();
    let mut rx = bus.subscribe();
    tokens
      .start("at", "rt", Some(&UserProfile::default()))
      .unwrap();

    tokens.clear("user clicked logout");

    assert_eq!(tokens.snapshot(), Session::default());
    for key in SessionKey::ALL {
      assert_eq!(tokens.get(key), None);
    }
    assert_eq!(
      rx.recv().await.unwrap(),
      AppEvent::SignInRequired {
        reason: "user clicked logout".to_string()
      }
    );
  }
}
