//! Store change notifications

use crate::store::Snapshot;

/// A change published by the [`MessageStore`](crate::store::MessageStore)
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A new conversation snapshot was published
    Messages { messages: Snapshot },

    /// The busy flag changed
    Busy { busy: bool },
}

impl StoreEvent {
    /// The snapshot if this is a messages event
    pub fn messages(&self) -> Option<&Snapshot> {
        match self {
            StoreEvent::Messages { messages } => Some(messages),
            StoreEvent::Busy { .. } => None,
        }
    }

    /// The new busy value if this is a busy event
    pub fn busy(&self) -> Option<bool> {
        match self {
            StoreEvent::Busy { busy } => Some(*busy),
            StoreEvent::Messages { .. } => None,
        }
    }
}
