//! Wire representation exchanged with the conversational service

use serde::{Deserialize, Serialize};

use crate::types::Role;

/// A message as sent to the service in a completion request.
///
/// Structured payloads (action arguments, agent state) travel as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Text {
        id: String,
        created_at: i64,
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    ActionExecution {
        id: String,
        created_at: i64,
        name: String,
        arguments: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    Result {
        id: String,
        created_at: i64,
        action_execution_id: String,
        action_name: String,
        result: String,
    },
    AgentState {
        id: String,
        created_at: i64,
        thread_id: String,
        agent_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        active: bool,
        role: Role,
        state: String,
        running: bool,
    },
    Image {
        id: String,
        created_at: i64,
        role: Role,
        format: String,
        bytes: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
}

/// Delivery status the service attaches to each streamed fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FragmentStatus {
    /// Still being generated
    Pending,
    /// Fully generated
    #[default]
    Success,
    /// Generation failed for this fragment
    Failed { reason: String },
}

/// A piece of conversational content as streamed back by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFragment {
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub status: FragmentStatus,
    #[serde(flatten)]
    pub body: FragmentBody,
}

/// Kind-specific payload of a [`WireFragment`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FragmentBody {
    /// Text, delivered as a list of streamed chunks
    Text {
        role: Role,
        #[serde(default)]
        content: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    /// Action call whose JSON arguments arrive as streamed chunks
    ActionExecution {
        name: String,
        #[serde(default)]
        arguments: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
    Result {
        action_execution_id: String,
        action_name: String,
        result: String,
    },
    AgentState {
        thread_id: String,
        agent_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        active: bool,
        role: Role,
        state: String,
        running: bool,
    },
    Image {
        role: Role,
        format: String,
        bytes: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },
}

impl WireFragment {
    /// Build a fragment with a fresh id and success status
    pub fn new(body: FragmentBody) -> Self {
        Self {
            id: crate::types::new_id(),
            created_at: crate::types::now_millis(),
            status: FragmentStatus::Success,
            body,
        }
    }

    /// A text fragment carrying a single chunk
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self::new(FragmentBody::Text {
            role,
            content: vec![content.into()],
            parent_message_id: None,
        })
    }

    /// An agent state fragment
    pub fn agent_state(
        thread_id: impl Into<String>,
        agent_name: impl Into<String>,
        state: &serde_json::Value,
        running: bool,
    ) -> Self {
        Self::new(FragmentBody::AgentState {
            thread_id: thread_id.into(),
            agent_name: agent_name.into(),
            node_name: None,
            run_id: None,
            active: running,
            role: Role::Assistant,
            state: state.to_string(),
            running,
        })
    }

    /// Agent name if this is an agent state fragment
    pub fn agent_name(&self) -> Option<&str> {
        match &self.body {
            FragmentBody::AgentState { agent_name, .. } => Some(agent_name),
            _ => None,
        }
    }
}
