//! Pure conversions between app messages and the service's wire format

use crate::types::Message;
use crate::wire::{FragmentBody, WireFragment, WireMessage};

/// Convert a message history to the request wire format, preserving order
pub fn to_wire_messages<M: AsRef<Message>>(messages: &[M]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| to_wire_message(m.as_ref()))
        .collect()
}

/// Convert a single message to its wire form
pub fn to_wire_message(message: &Message) -> WireMessage {
    match message {
        Message::Text {
            id,
            role,
            content,
            parent_message_id,
            created_at,
        } => WireMessage::Text {
            id: id.clone(),
            created_at: *created_at,
            role: *role,
            content: content.clone(),
            parent_message_id: parent_message_id.clone(),
        },
        Message::ActionExecution {
            id,
            name,
            arguments,
            parent_message_id,
            created_at,
        } => WireMessage::ActionExecution {
            id: id.clone(),
            created_at: *created_at,
            name: name.clone(),
            arguments: arguments.to_string(),
            parent_message_id: parent_message_id.clone(),
        },
        Message::Result {
            id,
            action_execution_id,
            action_name,
            result,
            created_at,
        } => WireMessage::Result {
            id: id.clone(),
            created_at: *created_at,
            action_execution_id: action_execution_id.clone(),
            action_name: action_name.clone(),
            result: result.clone(),
        },
        Message::AgentState {
            id,
            thread_id,
            agent_name,
            node_name,
            run_id,
            active,
            role,
            state,
            running,
            created_at,
        } => WireMessage::AgentState {
            id: id.clone(),
            created_at: *created_at,
            thread_id: thread_id.clone(),
            agent_name: agent_name.clone(),
            node_name: node_name.clone(),
            run_id: run_id.clone(),
            active: *active,
            role: *role,
            state: state.to_string(),
            running: *running,
        },
        Message::Image {
            id,
            role,
            format,
            bytes,
            parent_message_id,
            created_at,
        } => WireMessage::Image {
            id: id.clone(),
            created_at: *created_at,
            role: *role,
            format: format.clone(),
            bytes: bytes.clone(),
            parent_message_id: parent_message_id.clone(),
        },
    }
}

/// Convert streamed fragments to app messages, one message per fragment
pub fn to_app_messages(fragments: Vec<WireFragment>) -> Vec<Message> {
    fragments.into_iter().map(to_app_message).collect()
}

fn to_app_message(fragment: WireFragment) -> Message {
    let WireFragment {
        id,
        created_at,
        body,
        ..
    } = fragment;

    match body {
        FragmentBody::Text {
            role,
            content,
            parent_message_id,
        } => Message::Text {
            id,
            role,
            content: content.concat(),
            parent_message_id,
            created_at,
        },
        FragmentBody::ActionExecution {
            name,
            arguments,
            parent_message_id,
        } => Message::ActionExecution {
            arguments: parse_json_text(&arguments.concat(), &id),
            id,
            name,
            parent_message_id,
            created_at,
        },
        FragmentBody::Result {
            action_execution_id,
            action_name,
            result,
        } => Message::Result {
            id,
            action_execution_id,
            action_name,
            result,
            created_at,
        },
        FragmentBody::AgentState {
            thread_id,
            agent_name,
            node_name,
            run_id,
            active,
            role,
            state,
            running,
        } => Message::AgentState {
            state: parse_json_text(&state, &id),
            id,
            thread_id,
            agent_name,
            node_name,
            run_id,
            active,
            role,
            running,
            created_at,
        },
        FragmentBody::Image {
            role,
            format,
            bytes,
            parent_message_id,
        } => Message::Image {
            id,
            role,
            format,
            bytes,
            parent_message_id,
            created_at,
        },
    }
}

/// Parse a JSON payload carried as text. Empty text is an empty object;
/// unparsable text is kept verbatim as a JSON string.
fn parse_json_text(raw: &str, fragment_id: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                "Fragment {} carries invalid JSON payload, keeping raw text: {}",
                fragment_id,
                e
            );
            serde_json::Value::String(raw.to_string())
        }
    }
}

/// Collapse runs of consecutive agent state fragments from the same agent,
/// keeping only the last report of each run at the run's position.
pub fn collapse_adjacent_agent_state(fragments: Vec<WireFragment>) -> Vec<WireFragment> {
    let mut out: Vec<WireFragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let same_agent_run = match (out.last().and_then(|f| f.agent_name()), fragment.agent_name()) {
            (Some(prev), Some(next)) => prev == next,
            _ => false,
        };
        if same_agent_run {
            if let Some(last) = out.last_mut() {
                *last = fragment;
            }
        } else {
            out.push(fragment);
        }
    }
    out
}
