use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::Feature;
use crate::store::KeyValueStore;

/// Application events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
  /// A cached feature was rewritten by this instance
  CacheChanged(Feature),
  /// Another process changed a stored key
  StorageChanged { key: String },
  /// The session was torn down; the user has to sign in again
  SignInRequired { reason: String },
}

/// Publish/subscribe channel scoped to one application instance.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(64)
  }
}

impl EventBus {
  /// Create a bus that buffers up to `capacity` events per slow subscriber.
  pub fn new(capacity: usize) -> Self {
    let (tx, _rx) = broadcast::channel(capacity);
    Self { tx }
  }

  /// Publish an event. Having no subscribers is not an error.
  pub fn publish(&self, event: AppEvent) {
    debug!(?event, "publishing event");
    let _ = self.tx.send(event);
  }

  /// Subscribe to every event published after this call.
  pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
    self.tx.subscribe()
  }
}

/// Spawn a task that polls `store` for writes made by other processes and
/// publishes a [`AppEvent::StorageChanged`] per changed key.
pub fn spawn_storage_watcher(
  store: Arc<dyn KeyValueStore>,
  bus: EventBus,
  tick_rate: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(tick_rate);
    loop {
      ticker.tick().await;
      match store.poll_external_changes() {
        Ok(keys) => {
          for key in keys {
            bus.publish(AppEvent::StorageChanged { key });
          }
        }
        Err(e) => warn!(error = %e, "failed to poll storage for changes"),
      }
    }
  })
}
