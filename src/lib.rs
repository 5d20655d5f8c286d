//! Client for the Student Life backend: session handling with transparent
//! token refresh, a local dashboard cache and the sync operations feeding it.

pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod session;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
