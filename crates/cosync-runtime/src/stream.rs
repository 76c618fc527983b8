//! Streamed response increments

use crate::error::Result;
use crate::wire::WireFragment;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// One unit of a streamed completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseIncrement {
    /// Thread the response belongs to, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Run the response belongs to, when the service reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Message fragments; absent on keepalive increments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<WireFragment>>,
}

impl ResponseIncrement {
    /// An increment carrying the given fragments
    pub fn with_fragments(fragments: Vec<WireFragment>) -> Self {
        Self {
            messages: Some(fragments),
            ..Default::default()
        }
    }

    /// A keepalive increment with no payload
    pub fn keepalive() -> Self {
        Self::default()
    }

    /// Whether the increment carries at least one fragment
    pub fn has_payload(&self) -> bool {
        self.messages.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Take the fragments out, leaving the increment empty
    pub fn take_fragments(&mut self) -> Vec<WireFragment> {
        self.messages.take().unwrap_or_default()
    }
}

/// A lazy, finite, non-restartable stream of response increments
pub type IncrementStream = Pin<Box<dyn Stream<Item = Result<ResponseIncrement>> + Send>>;
