//! Client event dispatch with per-event reply correlation.
//!
//! Every dispatched event gets a fresh [`DispatchId`] and a slot in the
//! pending table. The single consumer of the [`EventStream`] answers it
//! through the attached [`Completion`] (or [`Dispatcher::complete`] by id);
//! whichever comes first removes the slot, so an event resolves at most once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::DispatchError;
use crate::protocol::{ClientEvent, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(u64);

impl DispatchId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type PendingMap = HashMap<DispatchId, oneshot::Sender<Vec<ServerMessage>>>;

#[derive(Debug, Clone, Default)]
struct PendingTable {
    inner: Arc<Mutex<PendingMap>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: DispatchId, tx: oneshot::Sender<Vec<ServerMessage>>) {
        self.lock().insert(id, tx);
    }

    fn remove(&self, id: DispatchId) -> Option<oneshot::Sender<Vec<ServerMessage>>> {
        self.lock().remove(&id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn resolve(&self, id: DispatchId, responses: Vec<ServerMessage>) -> Result<(), DispatchError> {
        let tx = self.remove(id).ok_or(DispatchError::UnknownDispatch(id))?;
        debug!(dispatch = %id, responses = responses.len(), "dispatch completed");
        if tx.send(responses).is_err() {
            debug!(dispatch = %id, "caller stopped waiting before completion");
        }
        Ok(())
    }
}

/// Publishing side of the event channel. Cheap to clone; all clones share
/// one pending table and one id sequence.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    next_id: Arc<AtomicU64>,
    pending: PendingTable,
    events: mpsc::UnboundedSender<DispatchedEvent>,
    timeout: Option<Duration>,
}

/// The consumer side of the event channel.
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::UnboundedReceiver<DispatchedEvent>,
}

/// A client event waiting for its server reply.
#[derive(Debug)]
pub struct DispatchedEvent {
    pub id: DispatchId,
    pub message: ClientEvent,
    pub completion: Completion,
}

/// Single-use handle that answers one dispatched event.
#[derive(Debug)]
pub struct Completion {
    id: DispatchId,
    pending: PendingTable,
}

/// The caller's side of one dispatch.
#[derive(Debug)]
pub struct PendingResponse {
    id: DispatchId,
    rx: oneshot::Receiver<Vec<ServerMessage>>,
    pending: PendingTable,
    timeout: Option<Duration>,
}

impl Dispatcher {
    /// Dispatcher whose replies are awaited without a deadline.
    pub fn new() -> (Self, EventStream) {
        Self::with_timeout(None)
    }

    pub fn from_config(config: &RuntimeConfig) -> (Self, EventStream) {
        Self::with_timeout(config.dispatch_timeout)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending: PendingTable::default(),
            events: tx,
            timeout,
        };
        (dispatcher, EventStream { events: rx })
    }

    /// Publishes `message` and returns the handle to await its reply.
    /// Identical events are never coalesced.
    pub fn dispatch(&self, message: ClientEvent) -> Result<PendingResponse, DispatchError> {
        let id = DispatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let event = DispatchedEvent {
            id,
            message,
            completion: Completion {
                id,
                pending: self.pending.clone(),
            },
        };
        if self.events.send(event).is_err() {
            self.pending.remove(id);
            warn!(dispatch = %id, "event stream dropped, dispatch abandoned");
            return Err(DispatchError::NoConsumer);
        }
        debug!(dispatch = %id, "event dispatched");

        Ok(PendingResponse {
            id,
            rx,
            pending: self.pending.clone(),
            timeout: self.timeout,
        })
    }

    /// Answers a dispatch by id, for consumers that do not keep the
    /// [`Completion`] around.
    pub fn complete(
        &self,
        id: DispatchId,
        responses: Vec<ServerMessage>,
    ) -> Result<(), DispatchError> {
        self.pending.resolve(id, responses)
    }

    /// Number of dispatches still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl EventStream {
    /// Next dispatched event; `None` once every [`Dispatcher`] is dropped.
    pub async fn next(&mut self) -> Option<DispatchedEvent> {
        self.events.recv().await
    }

    pub fn try_next(&mut self) -> Option<DispatchedEvent> {
        self.events.try_recv().ok()
    }
}

impl DispatchedEvent {
    pub fn resolve(self, responses: Vec<ServerMessage>) -> Result<(), DispatchError> {
        self.completion.resolve(responses)
    }
}

impl Completion {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    pub fn resolve(self, responses: Vec<ServerMessage>) -> Result<(), DispatchError> {
        self.pending.resolve(self.id, responses)
    }
}

impl PendingResponse {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    /// Overrides the dispatcher-wide deadline for this one wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Waits for the reply batch. Without a timeout this waits until the
    /// event is completed, however long that takes.
    pub async fn wait(self) -> Result<Vec<ServerMessage>, DispatchError> {
        let Self {
            id,
            rx,
            pending,
            timeout,
        } = self;

        let Some(timeout) = timeout else {
            return rx.await.map_err(|_| DispatchError::Closed(id));
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(responses)) => Ok(responses),
            Ok(Err(_)) => Err(DispatchError::Closed(id)),
            Err(_) => {
                pending.remove(id);
                warn!(dispatch = %id, ?timeout, "dispatch timed out");
                Err(DispatchError::TimedOut {
                    id,
                    millis: timeout.as_millis(),
                })
            }
        }
    }
}
