//! In-memory conversation message types

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Developer => "developer",
        }
    }
}

/// A unit of conversation content.
///
/// Messages are immutable once created; the chat store shares them by `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Plain text from any role
    Text {
        id: String,
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default)]
        created_at: i64,
    },
    /// The assistant asking the client to run an action
    ActionExecution {
        id: String,
        name: String,
        arguments: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default)]
        created_at: i64,
    },
    /// The outcome of an action execution
    Result {
        id: String,
        action_execution_id: String,
        action_name: String,
        result: String,
        #[serde(default)]
        created_at: i64,
    },
    /// A state report from a remote agent
    AgentState {
        id: String,
        thread_id: String,
        agent_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        active: bool,
        role: Role,
        state: serde_json::Value,
        running: bool,
        #[serde(default)]
        created_at: i64,
    },
    /// An image (base64 encoded)
    Image {
        id: String,
        role: Role,
        format: String,
        bytes: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default)]
        created_at: i64,
    },
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Message {
    /// Create a text message with the given role
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self::Text {
            id: new_id(),
            role,
            content: content.into(),
            parent_message_id: None,
            created_at: now_millis(),
        }
    }

    /// Create a user text message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Create an assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Create a system text message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Create an action execution message
    pub fn action_execution(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ActionExecution {
            id: new_id(),
            name: name.into(),
            arguments,
            parent_message_id: None,
            created_at: now_millis(),
        }
    }

    /// Create the result message for an action execution
    pub fn action_result(
        action_execution_id: impl Into<String>,
        action_name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::Result {
            id: new_id(),
            action_execution_id: action_execution_id.into(),
            action_name: action_name.into(),
            result: result.into(),
            created_at: now_millis(),
        }
    }

    /// Message id
    pub fn id(&self) -> &str {
        match self {
            Self::Text { id, .. }
            | Self::ActionExecution { id, .. }
            | Self::Result { id, .. }
            | Self::AgentState { id, .. }
            | Self::Image { id, .. } => id,
        }
    }

    /// Creation time in milliseconds since the epoch
    pub fn created_at(&self) -> i64 {
        match self {
            Self::Text { created_at, .. }
            | Self::ActionExecution { created_at, .. }
            | Self::Result { created_at, .. }
            | Self::AgentState { created_at, .. }
            | Self::Image { created_at, .. } => *created_at,
        }
    }

    /// Role of the author, if the message kind carries one.
    ///
    /// Action executions are always authored by the assistant; results have no role.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Text { role, .. } | Self::AgentState { role, .. } | Self::Image { role, .. } => {
                Some(*role)
            }
            Self::ActionExecution { .. } => Some(Role::Assistant),
            Self::Result { .. } => None,
        }
    }

    /// Text content, empty for non-text messages
    pub fn text_content(&self) -> &str {
        match self {
            Self::Text { content, .. } => content,
            _ => "",
        }
    }

    /// Whether this is an agent state report
    pub fn is_agent_state(&self) -> bool {
        matches!(self, Self::AgentState { .. })
    }
}
