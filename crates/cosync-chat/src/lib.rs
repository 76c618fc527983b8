//! cosync-chat: conversation state synchronized with a streaming completion service
//!
//! This crate holds the canonical message list of one conversation, runs at
//! most one streamed completion against a [`RuntimeClient`] at a time, and
//! publishes every merged increment to subscribers.
//!
//! [`RuntimeClient`]: cosync_runtime::RuntimeClient

mod cycle;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod service;
pub mod store;

pub use error::{Error, Result};
pub use events::StoreEvent;
pub use reconciler::{Merge, StreamReconciler};
pub use service::{ChatService, Completion, CompletionTask, CycleOutcome, ServiceOptions};
pub use store::{MessageStore, Snapshot, Subscription};
