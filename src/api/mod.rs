//! Backend access: URL building, the authenticated executor, token refresh
//! and typed endpoints.

mod client;
mod endpoints;
mod gateway;
mod refresh;
pub mod types;

pub use client::ApiClient;
pub use endpoints::{Registration, EMPTY_CHAT_REPLY};
pub use gateway::{build_url, is_exempt_from_auth, normalize_base, Gateway, RequestOptions};
pub use refresh::{BootOutcome, RefreshCoordinator, REFRESH_PATH};
