//! Runtime client abstraction and a scripted implementation for replays

use std::collections::VecDeque;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::stream::{IncrementStream, ResponseIncrement};
use crate::wire::WireMessage;

/// Payload of a completion request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRequest {
    /// Conversation history in wire format, oldest first
    pub messages: Vec<WireMessage>,
}

impl RuntimeRequest {
    /// Create a request for the given history
    pub fn new(messages: Vec<WireMessage>) -> Self {
        Self { messages }
    }
}

/// Capability to open a streamed completion against the conversational service.
///
/// Implementations must stop producing increments once `cancel` is cancelled.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Open a streamed completion for `request`
    async fn open(
        &self,
        request: RuntimeRequest,
        cancel: CancellationToken,
    ) -> Result<IncrementStream>;
}

/// One step of a scripted response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    /// Deliver an increment
    Increment(ResponseIncrement),
    /// Wait before the next step
    DelayMs(u64),
    /// Fail the stream with a transport error
    Error(String),
}

/// The scripted answer to one `open` call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedResponse {
    /// Fail the `open` call itself with this transport error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_error: Option<String>,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl ScriptedResponse {
    /// A response delivering the given increments back to back
    pub fn increments(increments: impl IntoIterator<Item = ResponseIncrement>) -> Self {
        Self {
            open_error: None,
            steps: increments.into_iter().map(ScriptStep::Increment).collect(),
        }
    }

    /// A response whose `open` call fails
    pub fn failing_open(message: impl Into<String>) -> Self {
        Self {
            open_error: Some(message.into()),
            steps: vec![],
        }
    }
}

/// A recorded conversation: one scripted response per completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub responses: Vec<ScriptedResponse>,
    /// Keep answering with the last response once the script is exhausted
    #[serde(default)]
    pub repeat_last: bool,
}

impl Script {
    /// Parse a script from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Script(e.to_string()))
    }
}

/// A [`RuntimeClient`] that replays a [`Script`], honouring cancellation
pub struct ScriptedClient {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    last: Mutex<Option<ScriptedResponse>>,
    repeat_last: bool,
    requests: Mutex<Vec<RuntimeRequest>>,
}

impl ScriptedClient {
    /// Create a client replaying `script`
    pub fn new(script: Script) -> Self {
        Self {
            responses: Mutex::new(script.responses.into()),
            last: Mutex::new(None),
            repeat_last: script.repeat_last,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a client answering successive requests with `responses`
    pub fn from_responses(responses: Vec<ScriptedResponse>) -> Self {
        Self::new(Script {
            responses,
            repeat_last: false,
        })
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<RuntimeRequest> {
        self.requests.lock().clone()
    }

    /// Number of scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> Option<ScriptedResponse> {
        let next = self.responses.lock().pop_front();
        match next {
            Some(response) => {
                if self.repeat_last {
                    *self.last.lock() = Some(response.clone());
                }
                Some(response)
            }
            None if self.repeat_last => self.last.lock().clone(),
            None => None,
        }
    }
}

#[async_trait]
impl RuntimeClient for ScriptedClient {
    async fn open(
        &self,
        request: RuntimeRequest,
        cancel: CancellationToken,
    ) -> Result<IncrementStream> {
        tracing::debug!(
            "Scripted open with {} message(s) in history",
            request.messages.len()
        );
        self.requests.lock().push(request);

        let response = self
            .next_response()
            .ok_or_else(|| Error::Script("no scripted responses left".to_string()))?;

        if let Some(message) = response.open_error {
            return Err(Error::Transport(message));
        }
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        let steps = response.steps;
        let increments: IncrementStream = Box::pin(stream! {
            for step in steps {
                if cancel.is_cancelled() {
                    yield Err(Error::Aborted);
                    return;
                }
                match step {
                    ScriptStep::Increment(increment) => yield Ok(increment),
                    ScriptStep::DelayMs(ms) => {
                        let aborted = tokio::select! {
                            _ = cancel.cancelled() => true,
                            _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
                        };
                        if aborted {
                            yield Err(Error::Aborted);
                            return;
                        }
                    }
                    ScriptStep::Error(message) => {
                        yield Err(Error::Transport(message));
                        return;
                    }
                }
            }
        });

        Ok(increments)
    }
}
