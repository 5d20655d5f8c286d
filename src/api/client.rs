//! Authenticated request executor.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::gateway::{is_exempt_from_auth, Gateway, RequestOptions};
use super::refresh::RefreshCoordinator;
use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::session::TokenStore;

/// Shared client for every backend call.
///
/// A 401 on a protected endpoint triggers one (single-flight) refresh and
/// exactly one retry. When authorization cannot be recovered the session is
/// cleared and the call fails with [`ClientError::SessionExpired`].
#[derive(Clone)]
pub struct ApiClient {
  gateway: Arc<Gateway>,
  refresher: RefreshCoordinator,
  tokens: TokenStore,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ClientError> {
    let gateway = Arc::new(Gateway::new(config, tokens.clone())?);
    let refresher = RefreshCoordinator::new(Arc::clone(&gateway), tokens.clone());
    Ok(Self {
      gateway,
      refresher,
      tokens,
    })
  }

  pub fn tokens(&self) -> &TokenStore {
    &self.tokens
  }

  pub fn refresher(&self) -> &RefreshCoordinator {
    &self.refresher
  }

  /// Execute a request and decode the unwrapped envelope as `T`.
  pub async fn execute<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ClientError> {
    let value = self.execute_value(path, &options).await?;
    Ok(serde_json::from_value(value)?)
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
    self.execute(path, RequestOptions::get()).await
  }

  pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.execute(path, RequestOptions::post_json(body)?).await
  }

  pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    self.execute(path, RequestOptions::put_json(body)?).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
    self.execute(path, RequestOptions::delete()).await
  }

  /// Send → classify → (refresh → retry) → unwrap or fail.
  async fn execute_value(&self, path: &str, options: &RequestOptions) -> Result<Value, ClientError> {
    let (mut status, mut text) = self.exchange(path, options).await?;

    if status == StatusCode::UNAUTHORIZED && !is_exempt_from_auth(&self.gateway.build_url(path)) {
      if self.tokens.refresh_token().is_none() {
        return Err(self.expire_session("unauthorized without refresh token"));
      }

      if let Err(e) = self.refresher.refresh().await {
        warn!(error = %e, path, "refresh failed while retrying request");
        return Err(self.expire_session("refresh failed"));
      }

      debug!(path, "retrying request after token refresh");
      match self.exchange(path, options).await {
        Ok((retry_status, _)) if retry_status == StatusCode::UNAUTHORIZED => {
          return Err(self.expire_session("still unauthorized after refresh"));
        }
        Ok(retried) => (status, text) = retried,
        Err(e) => {
          warn!(error = %e, path, "retry after refresh failed");
          return Err(self.expire_session("retry after refresh failed"));
        }
      }
    }

    let body = parse_body(&text);
    if !status.is_success() {
      return Err(ClientError::Api {
        status,
        message: failure_message(status, &body, &text),
      });
    }

    Ok(unwrap_envelope(body))
  }

  /// One round trip: status plus the body as text.
  async fn exchange(
    &self,
    path: &str,
    options: &RequestOptions,
  ) -> Result<(StatusCode, String), ClientError> {
    let response = self.gateway.send(path, options).await?;
    let status = response.status();
    let text = response.text().await?;
    debug!(path, %status, bytes = text.len(), "received response");
    Ok((status, text))
  }

  fn expire_session(&self, reason: &str) -> ClientError {
    self.tokens.clear(reason);
    ClientError::SessionExpired
  }
}

/// Parse a response body; empty or non-JSON text is `null`.
pub(crate) fn parse_body(text: &str) -> Value {
  if text.is_empty() {
    return Value::Null;
  }
  serde_json::from_str(text).unwrap_or(Value::Null)
}

/// `data` when the envelope carries a non-null one, else the whole body.
pub(crate) fn unwrap_envelope(body: Value) -> Value {
  match body {
    Value::Object(mut map) => match map.remove("data") {
      Some(data) if !data.is_null() => data,
      Some(data) => {
        map.insert("data".to_string(), data);
        Value::Object(map)
      }
      None => Value::Object(map),
    },
    other => other,
  }
}

/// Best-effort human-readable failure: `message`, then `error`, then the raw
/// body text, then `HTTP <status>`.
pub(crate) fn failure_message(status: StatusCode, body: &Value, text: &str) -> String {
  let field = |name: &str| {
    body
      .get(name)
      .and_then(Value::as_str)
      .filter(|s| !s.is_empty())
      .map(String::from)
  };

  field("message")
    .or_else(|| field("error"))
    .or_else(|| body.as_str().filter(|s| !s.is_empty()).map(String::from))
    .or_else(|| {
      let raw = text.trim();
      (!raw.is_empty() && !body.is_object()).then(|| raw.to_string())
    })
    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
