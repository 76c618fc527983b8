//! Turning store events into printable lines

use cosync_chat::StoreEvent;
use cosync_runtime::Message;
use serde_json::json;

use crate::config::OutputFormat;
use crate::utils::truncate_chars;

const PREVIEW_CHARS: usize = 200;

/// Formats store events for the terminal.
///
/// In text mode only messages not yet printed are emitted, so a snapshot
/// republished on every increment prints each message once.
pub struct Renderer {
    format: OutputFormat,
    show_busy: bool,
    printed: usize,
}

impl Renderer {
    pub fn new(format: OutputFormat, show_busy: bool) -> Self {
        Self {
            format,
            show_busy,
            printed: 0,
        }
    }

    /// Skip messages already on screen (e.g. the initial history)
    pub fn mark_printed(&mut self, count: usize) {
        self.printed = count;
    }

    /// Lines to print for one event
    pub fn render(&mut self, event: &StoreEvent) -> Vec<String> {
        match self.format {
            OutputFormat::Json => vec![event_json(event).to_string()],
            OutputFormat::Text => match event {
                StoreEvent::Messages { messages } => {
                    let start = self.printed.min(messages.len());
                    self.printed = messages.len();
                    messages[start..]
                        .iter()
                        .map(|m| format_message(m))
                        .collect()
                }
                StoreEvent::Busy { busy } if self.show_busy => {
                    vec![if *busy { "[busy]" } else { "[idle]" }.to_string()]
                }
                StoreEvent::Busy { .. } => vec![],
            },
        }
    }
}

fn event_json(event: &StoreEvent) -> serde_json::Value {
    match event {
        StoreEvent::Messages { messages } => {
            let messages: Vec<&Message> = messages.iter().map(|m| m.as_ref()).collect();
            json!({ "event": "messages", "messages": messages })
        }
        StoreEvent::Busy { busy } => json!({ "event": "busy", "busy": busy }),
    }
}

/// One-line summary of a message
pub fn format_message(message: &Message) -> String {
    match message {
        Message::Text { role, content, .. } => {
            format!("{}: {}", role.as_str(), content)
        }
        Message::ActionExecution {
            name, arguments, ..
        } => format!(
            "[action {}] {}",
            name,
            truncate_chars(&arguments.to_string(), PREVIEW_CHARS)
        ),
        Message::Result {
            action_name,
            result,
            ..
        } => format!(
            "[result {}] {}",
            action_name,
            truncate_chars(result, PREVIEW_CHARS)
        ),
        Message::AgentState {
            agent_name,
            node_name,
            running,
            state,
            ..
        } => {
            let status = if *running { "running" } else { "done" };
            match node_name {
                Some(node) => format!(
                    "[agent {}:{} {}] {}",
                    agent_name,
                    node,
                    status,
                    truncate_chars(&state.to_string(), PREVIEW_CHARS)
                ),
                None => format!(
                    "[agent {} {}] {}",
                    agent_name,
                    status,
                    truncate_chars(&state.to_string(), PREVIEW_CHARS)
                ),
            }
        }
        Message::Image {
            role,
            format,
            bytes,
            ..
        } => format!("{}: [image {}, {} bytes]", role.as_str(), format, bytes.len()),
    }
}
