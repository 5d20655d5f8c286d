//! Error types for the session, storage and request layers.

use reqwest::StatusCode;

/// Failure of the durable key/value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Could not determine data directory")]
  NoDataDir,
}

/// Failure of a token refresh.
///
/// Cloned into every caller attached to the same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
  #[error("No refresh token")]
  MissingRefreshToken,
  #[error("Refresh rejected: {0}")]
  Rejected(String),
  #[error("No access token from refresh")]
  MissingAccessToken,
  #[error("Refresh request failed: {0}")]
  Transport(String),
  #[error("Failed to persist refreshed tokens: {0}")]
  Storage(String),
  #[error("Refresh task was aborted")]
  Aborted,
}

/// Errors surfaced by [`crate::api::ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  /// Authorization could not be recovered; the session has been cleared.
  #[error("Session expired. Please sign in again.")]
  SessionExpired,
  /// Non-success response that is not eligible for a refresh retry.
  #[error("{message}")]
  Api { status: StatusCode, message: String },
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Invalid request URL {url}: {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },
  #[error("Failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),
  #[error(transparent)]
  Storage(#[from] StoreError),
  #[error("{0}")]
  InvalidInput(String),
  #[error("Server did not return {0}")]
  MissingToken(&'static str),
}

impl ClientError {
  /// HTTP status carried by an [`ClientError::Api`] failure.
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      Self::Api { status, .. } => Some(*status),
      _ => None,
    }
  }
}
