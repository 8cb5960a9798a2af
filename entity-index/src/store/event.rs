use crate::errors::IndexResult;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::Debug;
use std::sync::Arc;

/// Lifecycle events raised by a node store.
///
/// - **Open**: the store was opened or created
/// - **Commit**: a transaction's change set was flushed to the store
/// - **Closing**: the store is about to close
/// - **Closed**: the store has been closed
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StoreEvents {
    Open,
    Commit,
    Closing,
    Closed,
}

/// Event passed to store listeners.
#[derive(Clone, Debug)]
pub struct StoreEventInfo {
    event: StoreEvents,
    file_path: String,
}

impl StoreEventInfo {
    pub fn new(event: StoreEvents, file_path: &str) -> Self {
        StoreEventInfo {
            event,
            file_path: file_path.to_string(),
        }
    }

    pub fn event(&self) -> StoreEvents {
        self.event.clone()
    }

    /// Path of the backing file, empty for in-memory stores.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

pub trait StoreEventCallback: Send + Sync + Fn(StoreEventInfo) -> IndexResult<()> {}

impl<F> StoreEventCallback for F where F: Send + Sync + Fn(StoreEventInfo) -> IndexResult<()> {}

/// Callback registered for store lifecycle events.
///
/// ```rust
/// use entity_index::store::{StoreEventListener, StoreEvents};
///
/// let listener = StoreEventListener::new(|info| {
///     if info.event() == StoreEvents::Commit {
///         log::debug!("committed to {}", info.file_path());
///     }
///     Ok(())
/// });
/// # let _ = listener;
/// ```
#[derive(Clone)]
pub struct StoreEventListener {
    on_event: Arc<dyn StoreEventCallback>,
}

impl StoreEventListener {
    pub fn new(on_event: impl StoreEventCallback + 'static) -> Self {
        StoreEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<StoreEventInfo> for StoreEventListener {
    fn handle(&self, event: &Event<StoreEventInfo>) -> Result<(), BasuError> {
        (self.on_event)(event.data.clone())
            .map_err(|e| BasuError::HandlerError(anyhow::Error::from(e)))
    }
}

impl Debug for StoreEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEventListener").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, IndexError};

    #[test]
    fn test_listener_handles_event() {
        let listener = StoreEventListener::new(|info| {
            assert_eq!(info.event(), StoreEvents::Open);
            Ok(())
        });
        let event = Event::new(StoreEventInfo::new(StoreEvents::Open, ""));
        assert!(listener.handle(&event).is_ok());
    }

    #[test]
    fn test_listener_failure_becomes_handler_error() {
        let listener = StoreEventListener::new(|_| {
            Err(IndexError::new("listener failed", ErrorKind::InvalidOperation))
        });
        let event = Event::new(StoreEventInfo::new(StoreEvents::Commit, "ratings.idx"));
        assert!(matches!(
            listener.handle(&event),
            Err(BasuError::HandlerError(_))
        ));
    }

    #[test]
    fn test_event_info_carries_path() {
        let info = StoreEventInfo::new(StoreEvents::Closed, "/tmp/players.idx");
        assert_eq!(info.file_path(), "/tmp/players.idx");
        assert!(format!("{:?}", info).contains("Closed"));
    }
}
