//! Fixtures shared by the unit tests.

use std::sync::Arc;
use wiremock::MockServer;

use crate::api::ApiClient;
use crate::config::ApiConfig;
use crate::event::EventBus;
use crate::session::TokenStore;
use crate::store::MemoryStore;

/// Point the client at a mock server with the usual `/api` base.
pub(crate) fn api_config(server: &MockServer) -> ApiConfig {
  ApiConfig {
    base: format!("{}/api", server.uri()),
    origin: server.uri(),
    timeout_secs: Some(5),
  }
}

pub(crate) fn memory_tokens() -> TokenStore {
  memory_tokens_with_bus().0
}

pub(crate) fn memory_tokens_with_bus() -> (TokenStore, EventBus) {
  let bus = EventBus::default();
  let tokens = TokenStore::new(Arc::new(MemoryStore::new()), bus.clone());
  (tokens, bus)
}

pub(crate) fn api_client(server: &MockServer, tokens: &TokenStore) -> ApiClient {
  ApiClient::new(&api_config(server), tokens.clone()).unwrap()
}
