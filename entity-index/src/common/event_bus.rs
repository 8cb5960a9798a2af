use crate::common::INDEX_EVENT;
use crate::errors::{ErrorKind, IndexError, IndexResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Typed wrapper over a `basu` event bus carrying events of type `E` to listeners of type `L`.
#[derive(Clone)]
pub struct IndexEventBus<E, L> {
    inner: Arc<IndexEventBusInner<E, L>>,
}

impl<E, L> Default for IndexEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> IndexEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        IndexEventBus {
            inner: Arc::new(IndexEventBusInner::new()),
        }
    }

    pub fn register(&self, listener: L) -> IndexResult<SubscriberRef> {
        self.inner.register(listener)
    }

    pub fn deregister(&self, subscriber: SubscriberRef) -> IndexResult<()> {
        self.inner.deregister(subscriber)
    }

    /// Delivers `event` to every listener.
    ///
    /// While another call is delivering, `event` is queued and handed to that
    /// call instead, so a listener may publish again without blocking. Errors
    /// are reported to the call that delivered the failing event.
    pub fn publish(&self, event: E) -> IndexResult<()> {
        self.inner.publish(event)
    }

    pub fn close(&self) -> IndexResult<()> {
        self.inner.close()
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.has_listeners()
    }
}

/// Handle returned on registration, used to remove the listener again.
pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub fn new(inner: HandlerId) -> Self {
        SubscriberRef { inner }
    }
}

struct IndexEventBusInner<E, L> {
    event_bus: EventBus<E>,
    pending: Mutex<VecDeque<E>>,
    draining: AtomicBool,
    phantom_data: PhantomData<L>,
}

impl<E, L> IndexEventBusInner<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn new() -> Self {
        IndexEventBusInner {
            event_bus: EventBus::new(),
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            phantom_data: PhantomData,
        }
    }

    fn register(&self, listener: L) -> IndexResult<SubscriberRef> {
        self.event_bus
            .subscribe(INDEX_EVENT, Box::new(listener))
            .map(SubscriberRef::new)
            .map_err(Self::index_error)
    }

    fn deregister(&self, subscriber: SubscriberRef) -> IndexResult<()> {
        self.event_bus
            .unsubscribe(INDEX_EVENT, &subscriber.inner)
            .map_err(Self::index_error)
    }

    fn publish(&self, event: E) -> IndexResult<()> {
        self.pending.lock().push_back(event);
        if self.draining.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut result = Ok(());
        loop {
            let next = self.pending.lock().pop_front();
            match next {
                Some(event) => {
                    if let Err(err) = self.deliver(event) {
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                }
                None => {
                    self.draining.store(false, Ordering::SeqCst);
                    // an event queued after the last pop belongs to us unless
                    // another call took over draining
                    if self.pending.lock().is_empty() || self.draining.swap(true, Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }
        result
    }

    fn deliver(&self, event: E) -> IndexResult<()> {
        if !self.has_listeners() {
            return Ok(());
        }

        let basu_event = Event::new(event);
        self.event_bus
            .publish(INDEX_EVENT, &basu_event)
            .map_err(Self::index_error)
    }

    fn close(&self) -> IndexResult<()> {
        self.event_bus.clear().map_err(Self::index_error)
    }

    fn has_listeners(&self) -> bool {
        match self.event_bus.get_handler_count(INDEX_EVENT) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Failed to check listeners: {}, defaulting to false", e);
                false
            }
        }
    }

    fn index_error(e: BasuError) -> IndexError {
        match e {
            BasuError::EventTypeNotFOUND => IndexError::new(
                "Event bus error: no handler is registered for store events",
                ErrorKind::EventError,
            ),
            BasuError::MutexPoisoned => IndexError::new(
                "Event bus error: internal mutex poisoned",
                ErrorKind::EventError,
            ),
            BasuError::HandlerError(e) => IndexError::new(
                &format!("Event handler error: {}", e),
                ErrorKind::EventError,
            ),
        }
    }
}
