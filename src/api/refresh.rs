//! Token refresh with single-flight de-duplication.
//!
//! When several requests fail with an expired token at the same moment, only
//! the first one starts a refresh; the others attach to the pending one and
//! observe the same outcome. The pending reference is dropped as soon as the
//! refresh settles, so the next caller after that starts a fresh attempt.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::client::{failure_message, parse_body};
use super::gateway::{Gateway, RequestOptions};
use super::types::{RefreshRequest, RefreshResponse};
use crate::error::RefreshError;
use crate::session::{SessionKey, TokenStore};

/// Endpoint minting a new access token from a refresh token.
pub const REFRESH_PATH: &str = "/users/refresh";

type PendingRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

/// Result of [`RefreshCoordinator::ensure_auth_on_boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
  /// An access token was already stored
  Authenticated,
  /// No tokens at all
  Anonymous,
  /// The access token was minted from the stored refresh token
  Refreshed,
  /// The boot refresh failed and the session was cleared
  SignedOut,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
  gateway: Arc<Gateway>,
  tokens: TokenStore,
  pending: Arc<Mutex<Option<PendingRefresh>>>,
}

impl RefreshCoordinator {
  pub fn new(gateway: Arc<Gateway>, tokens: TokenStore) -> Self {
    Self {
      gateway,
      tokens,
      pending: Arc::new(Mutex::new(None)),
    }
  }

  /// Refresh the access token, joining an in-flight refresh if there is one.
  pub async fn refresh(&self) -> Result<(), RefreshError> {
    let pending = {
      let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      match slot.as_ref() {
        Some(existing) => {
          debug!("joining in-flight token refresh");
          existing.clone()
        }
        None => {
          // Runs as its own task so dropped callers cannot strand the others
          let task = tokio::spawn(Self::run(
            Arc::clone(&self.gateway),
            self.tokens.clone(),
            Arc::clone(&self.pending),
          ));
          let shared = async move { task.await.unwrap_or(Err(RefreshError::Aborted)) }
            .boxed()
            .shared();
          *slot = Some(shared.clone());
          shared
        }
      }
    };

    pending.await
  }

  /// Whether a refresh is currently in flight.
  pub fn is_refreshing(&self) -> bool {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  async fn run(
    gateway: Arc<Gateway>,
    tokens: TokenStore,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
  ) -> Result<(), RefreshError> {
    let outcome = refresh_tokens(&gateway, &tokens).await;

    // Settled: the next caller starts over
    pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();

    match &outcome {
      Ok(()) => info!("access token refreshed"),
      Err(e) => warn!(error = %e, "token refresh failed"),
    }
    outcome
  }

  /// Mint an access token before anything protected runs, if only a refresh
  /// token survived. A failed attempt clears the session.
  pub async fn ensure_auth_on_boot(&self) -> BootOutcome {
    if self.tokens.access_token().is_some() {
      return BootOutcome::Authenticated;
    }
    if self.tokens.refresh_token().is_none() {
      return BootOutcome::Anonymous;
    }

    match self.refresh().await {
      Ok(()) => BootOutcome::Refreshed,
      Err(_) => {
        self.tokens.clear("refresh on boot failed");
        BootOutcome::SignedOut
      }
    }
  }
}

/// One refresh round trip; persists the new tokens on success.
async fn refresh_tokens(gateway: &Gateway, tokens: &TokenStore) -> Result<(), RefreshError> {
  let refresh_token = tokens
    .refresh_token()
    .ok_or(RefreshError::MissingRefreshToken)?;

  let options = RequestOptions::post_json(&RefreshRequest {
    refresh_token: &refresh_token,
  })
  .map_err(|e| RefreshError::Transport(e.to_string()))?;

  let response = gateway
    .send(REFRESH_PATH, &options)
    .await
    .map_err(|e| RefreshError::Transport(e.to_string()))?;
  let status = response.status();
  let text = response
    .text()
    .await
    .map_err(|e| RefreshError::Transport(e.to_string()))?;
  let body = parse_body(&text);

  if !status.is_success() {
    return Err(RefreshError::Rejected(failure_message(
      status, &body, &text,
    )));
  }

  let parsed: RefreshResponse = serde_json::from_value(body).unwrap_or_default();
  let access_token = parsed
    .access_token
    .filter(|t| !t.is_empty())
    .ok_or(RefreshError::MissingAccessToken)?;

  tokens
    .set(SessionKey::AccessToken, &access_token)
    .map_err(|e| RefreshError::Storage(e.to_string()))?;
  if let Some(rotated) = parsed.refresh_token.filter(|t| !t.is_empty()) {
    tokens
      .set(SessionKey::RefreshToken, &rotated)
      .map_err(|e| RefreshError::Storage(e.to_string()))?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::AppEvent;
  use crate::test_support::{api_config, memory_tokens_with_bus};
  use futures::future::join_all;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn coordinator(server: &MockServer, tokens: &TokenStore) -> RefreshCoordinator {
    let gateway = Gateway::new(&api_config(server), tokens.clone()).unwrap();
    RefreshCoordinator::new(Arc::new(gateway), tokens.clone())
  }

  #[tokio::test]
  async fn test_refresh_persists_rotated_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/users/refresh"))
      .and(body_json(json!({"refreshToken": "rt-old"})))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-new", "refreshToken": "rt-new"})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt-old").unwrap();

    coordinator(&server, &tokens).refresh().await.unwrap();

    assert_eq!(tokens.access_token().as_deref(), Some("at-new"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("rt-new"));
  }

  #[tokio::test]
  async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-new"})))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt-old").unwrap();

    coordinator(&server, &tokens).refresh().await.unwrap();

    assert_eq!(tokens.refresh_token().as_deref(), Some("rt-old"));
  }

  #[tokio::test]
  async fn test_refresh_without_refresh_token_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let err = coordinator(&server, &tokens).refresh().await.unwrap_err();
    assert_eq!(err, RefreshError::MissingRefreshToken);
  }

  #[tokio::test]
  async fn test_refresh_rejected_and_missing_access_token() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(401).set_body_string("Invalid refresh token"))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refreshToken": "rt"})))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    let refresher = coordinator(&server, &tokens);

    assert_eq!(
      refresher.refresh().await.unwrap_err(),
      RefreshError::Rejected("Invalid refresh token".to_string())
    );
    assert_eq!(
      refresher.refresh().await.unwrap_err(),
      RefreshError::MissingAccessToken
    );
    assert_eq!(tokens.access_token(), None);
  }

  #[tokio::test]
  async fn test_concurrent_refreshes_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"accessToken": "at-new"}))
          .set_delay(Duration::from_millis(100)),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    let refresher = coordinator(&server, &tokens);

    let outcomes = join_all((0..5).map(|_| refresher.refresh())).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert!(!refresher.is_refreshing());
    assert_eq!(tokens.access_token().as_deref(), Some("at-new"));
  }

  #[tokio::test]
  async fn test_concurrent_callers_share_failure() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(
        ResponseTemplate::new(401)
          .set_body_json(json!({"message": "Refresh token expired"}))
          .set_delay(Duration::from_millis(100)),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    let refresher = coordinator(&server, &tokens);

    let outcomes = join_all((0..3).map(|_| refresher.refresh())).await;

    for outcome in outcomes {
      assert_eq!(
        outcome.unwrap_err(),
        RefreshError::Rejected("Refresh token expired".to_string())
      );
    }
  }

  #[tokio::test]
  async fn test_settled_refresh_is_not_reused() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at"})))
      .expect(2)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    let refresher = coordinator(&server, &tokens);

    refresher.refresh().await.unwrap();
    refresher.refresh().await.unwrap();
  }

  #[tokio::test]
  async fn test_boot_is_noop_with_access_token_or_without_tokens() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let refresher = coordinator(&server, &tokens);
    assert_eq!(refresher.ensure_auth_on_boot().await, BootOutcome::Anonymous);

    tokens.set(SessionKey::AccessToken, "at").unwrap();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    assert_eq!(
      refresher.ensure_auth_on_boot().await,
      BootOutcome::Authenticated
    );
  }

  #[tokio::test]
  async fn test_boot_refreshes_once_when_only_refresh_token_survives() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-boot"})))
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, bus) = memory_tokens_with_bus();
    let mut rx = bus.subscribe();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();

    let outcome = coordinator(&server, &tokens).ensure_auth_on_boot().await;

    assert_eq!(outcome, BootOutcome::Refreshed);
    assert_eq!(tokens.access_token().as_deref(), Some("at-boot"));
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_boot_failure_signs_out() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(401).set_body_string("Refresh token expired"))
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, bus) = memory_tokens_with_bus();
    let mut rx = bus.subscribe();
    tokens.set(SessionKey::RefreshToken, "rt").unwrap();
    tokens.set(SessionKey::User, "{}").unwrap();

    let outcome = coordinator(&server, &tokens).ensure_auth_on_boot().await;

    assert_eq!(outcome, BootOutcome::SignedOut);
    assert_eq!(tokens.refresh_token(), None);
    assert_eq!(tokens.get(SessionKey::User), None);
    assert!(matches!(
      rx.recv().await.unwrap(),
      AppEvent::SignInRequired { .. }
    ));
  }
}
