//! URL construction, auth-exemption rules and the raw network call.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::session::TokenStore;

/// Prefix collapsed by [`build_url`] when both base and path carry it.
const API_PREFIX: &str = "/api";

/// Endpoints that must never receive an Authorization header.
const AUTH_EXEMPT_SUFFIXES: [&str; 3] = ["/users/login", "/users/refresh", "/users/register"];

/// Strip trailing slashes from a configured base.
pub fn normalize_base(raw: &str) -> String {
  raw.trim_end_matches('/').to_string()
}

/// Join `base` and `input`.
///
/// Absolute inputs pass through. When the base ends with `/api` and the path
/// starts with `/api/`, the path's prefix is sliced off so it appears once.
pub fn build_url(base: &str, input: &str) -> String {
  if input.starts_with("http") {
    return input.to_string();
  }

  let mut path = if input.starts_with('/') {
    input.to_string()
  } else {
    format!("/{input}")
  };

  let prefixed_path = format!("{API_PREFIX}/");
  if base.to_lowercase().ends_with(API_PREFIX) && path.to_lowercase().starts_with(&prefixed_path) {
    path = path[API_PREFIX.len()..].to_string();
  }

  format!("{base}{path}")
}

/// Whether `url` targets sign-in, refresh or registration. Query string and
/// fragment are ignored.
pub fn is_exempt_from_auth(url: &str) -> bool {
  let without_fragment = url.split('#').next().unwrap_or_default();
  let path = without_fragment.split('?').next().unwrap_or_default();
  AUTH_EXEMPT_SUFFIXES
    .iter()
    .any(|suffix| path.ends_with(suffix))
}

/// Method, headers and body of a request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
  pub method: Method,
  pub headers: HeaderMap,
  pub body: Option<String>,
}

impl RequestOptions {
  pub fn new(method: Method) -> Self {
    Self {
      method,
      headers: HeaderMap::new(),
      body: None,
    }
  }

  pub fn get() -> Self {
    Self::new(Method::GET)
  }

  pub fn delete() -> Self {
    Self::new(Method::DELETE)
  }

  pub fn post_json<B: Serialize + ?Sized>(body: &B) -> Result<Self, ClientError> {
    Self::new(Method::POST).with_json(body)
  }

  pub fn put_json<B: Serialize + ?Sized>(body: &B) -> Result<Self, ClientError> {
    Self::new(Method::PUT).with_json(body)
  }

  pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
    self.body = Some(serde_json::to_string(body)?);
    Ok(self)
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }
}

/// Issues requests against the configured API base.
pub struct Gateway {
  http: reqwest::Client,
  base: String,
  origin: Url,
  tokens: TokenStore,
}

impl Gateway {
  pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ClientError> {
    // reqwest keeps neither cookies nor an HTTP cache
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder.build()?;

    let origin = Url::parse(&config.origin).map_err(|source| ClientError::InvalidUrl {
      url: config.origin.clone(),
      source,
    })?;

    Ok(Self {
      http,
      base: normalize_base(&config.base),
      origin,
      tokens,
    })
  }

  pub fn build_url(&self, path: &str) -> String {
    build_url(&self.base, path)
  }

  /// Resolve a built URL; root-relative results are resolved against the
  /// configured origin.
  fn resolve(&self, url: &str) -> Result<Url, ClientError> {
    let resolved = if url.starts_with("http") {
      Url::parse(url)
    } else {
      self.origin.join(url)
    };
    resolved.map_err(|source| ClientError::InvalidUrl {
      url: url.to_string(),
      source,
    })
  }

  /// Headers for a request to `url`, layered over the caller's own.
  fn headers_for(&self, url: &str, options: &RequestOptions) -> HeaderMap {
    let mut headers = options.headers.clone();

    if !headers.contains_key(ACCEPT) {
      headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }

    if !is_exempt_from_auth(url) {
      if let Some(token) = self.tokens.access_token() {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
          headers.insert(AUTHORIZATION, value);
        }
      }
    }

    if options.body.is_some() && !headers.contains_key(CONTENT_TYPE) {
      headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    headers
  }

  /// Send one request. Status codes are not interpreted here.
  pub async fn send(
    &self,
    path: &str,
    options: &RequestOptions,
  ) -> Result<reqwest::Response, ClientError> {
    let url = self.build_url(path);
    let headers = self.headers_for(&url, options);
    let target = self.resolve(&url)?;

    debug!(
      method = %options.method,
      url = %target,
      authorized = headers.contains_key(AUTHORIZATION),
      "sending request"
    );

    let mut request = self
      .http
      .request(options.method.clone(), target)
      .headers(headers);
    if let Some(body) = &options.body {
      request = request.body(body.clone());
    }

    Ok(request.send().await?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::SessionKey;
  use crate::test_support::{api_config, memory_tokens};
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_build_url_collapses_duplicate_prefix() {
    assert_eq!(build_url("/api", "/api/expenses/search"), "/api/expenses/search");
    assert_eq!(
      build_url("http://localhost:8080/api", "/api/x"),
      "http://localhost:8080/api/x"
    );
    assert_eq!(build_url("/API", "/api/x"), "/api/x");
  }

  #[test]
  fn test_build_url_plain_join() {
    assert_eq!(build_url("/api", "/tasks/search"), "/api/tasks/search");
    assert_eq!(build_url("/api", "tasks/search"), "/api/tasks/search");
    assert_eq!(build_url("", "/api/x"), "/api/x");
    assert_eq!(
      build_url("http://host:8080", "/api/x"),
      "http://host:8080/api/x"
    );
  }

  #[test]
  fn test_build_url_only_collapses_whole_segment() {
    // "/apis" is not the prefix segment
    assert_eq!(build_url("/api", "/apis/x"), "/api/apis/x");
    // Exactly "/api" without a trailing segment is left alone
    assert_eq!(build_url("/api", "/api"), "/api/api");
  }

  #[test]
  fn test_build_url_absolute_untouched() {
    assert_eq!(
      build_url("/api", "https://other.example.com/api/chat"),
      "https://other.example.com/api/chat"
    );
  }

  #[test]
  fn test_normalize_base() {
    assert_eq!(normalize_base("http://localhost:8080/api///"), "http://localhost:8080/api");
    assert_eq!(normalize_base("/api"), "/api");
  }

  #[test]
  fn test_exemption_ignores_query_and_fragment() {
    assert!(is_exempt_from_auth("/api/users/login"));
    assert!(is_exempt_from_auth("http://host/api/users/refresh?x=1"));
    assert!(is_exempt_from_auth("/api/users/register#form"));
    assert!(is_exempt_from_auth("/api/users/login?next=/a#b"));

    assert!(!is_exempt_from_auth("/api/users/profile"));
    assert!(!is_exempt_from_auth("/api/users/login/history"));
    assert!(!is_exempt_from_auth("/api/tasks/search?q=/users/login"));
  }

  async fn recorded_authorization(server: &MockServer) -> Vec<Option<String>> {
    server
      .received_requests()
      .await
      .unwrap()
      .iter()
      .map(|r| {
        r.headers
          .get("authorization")
          .and_then(|v| v.to_str().ok())
          .map(String::from)
      })
      .collect()
  }

  #[tokio::test]
  async fn test_send_attaches_bearer_to_protected_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let tokens = memory_tokens();
    tokens.set(SessionKey::AccessToken, "at-1").unwrap();
    let gateway = Gateway::new(&api_config(&server), tokens).unwrap();

    gateway.send("/api/tasks", &RequestOptions::get()).await.unwrap();
    gateway.send("/courses/my-courses?x=1", &RequestOptions::get()).await.unwrap();

    assert_eq!(
      recorded_authorization(&server).await,
      vec![Some("Bearer at-1".to_string()), Some("Bearer at-1".to_string())]
    );
  }

  #[tokio::test]
  async fn test_send_never_attaches_bearer_to_exempt_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let tokens = memory_tokens();
    tokens.set(SessionKey::AccessToken, "at-1").unwrap();
    let gateway = Gateway::new(&api_config(&server), tokens).unwrap();

    for endpoint in ["/users/login", "/users/refresh", "/api/users/register"] {
      let options = RequestOptions::post_json(&serde_json::json!({})).unwrap();
      gateway.send(endpoint, &options).await.unwrap();
    }

    assert_eq!(recorded_authorization(&server).await, vec![None, None, None]);
  }

  #[tokio::test]
  async fn test_send_without_token_has_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let gateway = Gateway::new(&api_config(&server), memory_tokens()).unwrap();
    gateway.send("/tasks", &RequestOptions::get()).await.unwrap();

    assert_eq!(recorded_authorization(&server).await, vec![None]);
  }

  #[tokio::test]
  async fn test_send_default_headers() {
    let server = MockServer::start().await;
    Mock::given(path("/api/expenses/add"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let gateway = Gateway::new(&api_config(&server), memory_tokens()).unwrap();

    gateway.send("/expenses/add", &RequestOptions::get()).await.unwrap();
    let with_body = RequestOptions::post_json(&serde_json::json!({"amount": 1})).unwrap();
    gateway.send("/expenses/add", &with_body).await.unwrap();
    let custom = RequestOptions::post_json(&serde_json::json!({}))
      .unwrap()
      .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    gateway.send("/expenses/add", &custom).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_types: Vec<Option<&str>> = requests
      .iter()
      .map(|r| r.headers.get("content-type").and_then(|v| v.to_str().ok()))
      .collect();
    assert_eq!(
      content_types,
      vec![None, Some("application/json"), Some("text/plain")]
    );
    assert!(requests
      .iter()
      .all(|r| r.headers.get("accept").and_then(|v| v.to_str().ok()) == Some("application/json")));
    assert_eq!(requests[1].body, br#"{"amount":1}"#.to_vec());
  }

  #[test]
  fn test_root_relative_base_resolves_against_origin() {
    let config = ApiConfig {
      base: "/api/".to_string(),
      origin: "http://localhost:8080".to_string(),
      timeout_secs: None,
    };
    let gateway = Gateway::new(&config, memory_tokens()).unwrap();

    let url = gateway.build_url("/api/tasks/search");
    assert_eq!(url, "/api/tasks/search");
    assert_eq!(
      gateway.resolve(&url).unwrap().as_str(),
      "http://localhost:8080/api/tasks/search"
    );
  }
}
