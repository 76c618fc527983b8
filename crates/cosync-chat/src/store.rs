//! Conversation state: the published message snapshot, the busy flag, and
//! their subscribers.

use std::sync::Arc;

use cosync_runtime::Message;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::StoreEvent;

/// An immutable, ordered view of the conversation
pub type Snapshot = Arc<[Arc<Message>]>;

struct StoreState {
    messages: Snapshot,
    busy: bool,
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl StoreState {
    /// Deliver to every live subscriber, dropping the ones that went away.
    fn notify(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn replace(&mut self, messages: Snapshot) -> Snapshot {
        tracing::trace!("Publishing snapshot with {} message(s)", messages.len());
        self.messages = messages.clone();
        self.notify(StoreEvent::Messages {
            messages: messages.clone(),
        });
        messages
    }

    fn extended(&self, tail: &[Arc<Message>]) -> Snapshot {
        self.messages.iter().chain(tail.iter()).cloned().collect()
    }
}

/// Holds the conversation snapshot and busy flag and fans changes out to
/// subscribers.
///
/// Every mutation publishes and notifies under one lock, so subscribers see
/// changes in exactly the order they were made.
pub struct MessageStore {
    state: Mutex<StoreState>,
    idle_notify: Notify,
}

impl MessageStore {
    /// Create a store seeded with `initial` messages
    pub fn new(initial: impl IntoIterator<Item = Message>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                messages: initial.into_iter().map(Arc::new).collect(),
                busy: false,
                subscribers: Vec::new(),
            }),
            idle_notify: Notify::new(),
        }
    }

    /// The latest published snapshot
    pub fn current_messages(&self) -> Snapshot {
        self.state.lock().messages.clone()
    }

    /// Number of messages in the latest snapshot
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Whether the conversation is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one message and publish the result before returning
    pub fn append(&self, message: impl Into<Arc<Message>>) -> Snapshot {
        self.extend([message.into()])
    }

    /// Append several messages as a single publication
    pub fn extend(&self, messages: impl IntoIterator<Item = Arc<Message>>) -> Snapshot {
        let tail: Vec<Arc<Message>> = messages.into_iter().collect();
        let mut state = self.state.lock();
        if tail.is_empty() {
            return state.messages.clone();
        }
        let next = state.extended(&tail);
        state.replace(next)
    }

    /// Replace the published snapshot
    pub fn publish(&self, snapshot: Snapshot) {
        self.state.lock().replace(snapshot);
    }

    /// Publish `snapshot` only if the current snapshot is still `expected`.
    /// Returns whether it was published.
    pub fn publish_if_current(&self, expected: &Snapshot, snapshot: Snapshot) -> bool {
        let mut state = self.state.lock();
        if !Arc::ptr_eq(&state.messages, expected) {
            return false;
        }
        state.replace(snapshot);
        true
    }

    /// Publish a streamed merge.
    ///
    /// `expected` is the snapshot the previous merge of the same stream
    /// produced. While it is still current, `merged` becomes the new snapshot.
    /// Once anyone else has published, `expected` never matches again and
    /// every `chunk` is appended after the current messages, so nothing
    /// already published is lost. Returns the snapshot that was published.
    pub fn publish_merge(
        &self,
        expected: &Snapshot,
        merged: Snapshot,
        chunk: &[Arc<Message>],
    ) -> Snapshot {
        let mut state = self.state.lock();
        if Arc::ptr_eq(&state.messages, expected) {
            return state.replace(merged);
        }
        tracing::debug!(
            "Conversation changed while streaming, appending {} message(s) after it",
            chunk.len()
        );
        let next = state.extended(chunk);
        state.replace(next)
    }

    /// Whether a completion is in flight
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Set the busy flag. Subscribers hear about actual changes only.
    pub fn set_busy(&self, busy: bool) {
        {
            let mut state = self.state.lock();
            if state.busy == busy {
                return;
            }
            state.busy = busy;
            state.notify(StoreEvent::Busy { busy });
        }
        if !busy {
            self.idle_notify.notify_waiters();
        }
    }

    /// Wait until the busy flag is false.
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_busy() {
            return;
        }
        notified.await;
    }

    /// Receive every change made after this call
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        Subscription { rx }
    }

    /// Subscribe and read the current state in one step, so no change can
    /// slip between the read and the registration.
    pub fn subscribe_with_current(&self) -> (Snapshot, bool, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.subscribers.push(tx);
        (state.messages.clone(), state.busy, Subscription { rx })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new([])
    }
}

/// A registration for store changes. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StoreEvent>,
}

impl Subscription {
    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    /// Take the next change if one is already queued
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued change
    pub fn drain(&mut self) -> Vec<StoreEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stop receiving changes. Events already received are unaffected.
    pub fn unsubscribe(self) {}

    /// Consume the subscription as a `Stream` of changes
    pub fn into_stream(self) -> UnboundedReceiverStream<StoreEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}
