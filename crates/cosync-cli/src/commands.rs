//! Slash commands for interactive mode

/// Result of parsing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Cancel the in-flight completion
    Stop,
    /// Print the current conversation
    Messages,
    /// Print busy state and message count
    Status,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary input.
pub fn parse_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),
        "stop" | "s" => CommandResult::Stop,
        "messages" | "m" => CommandResult::Messages,
        "status" => CommandResult::Status,
        "quit" | "exit" | "q" => CommandResult::Exit,
        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /stop, /s            Cancel the running completion
  /messages, /m        Print the conversation
  /status              Show whether a completion is running
  /quit, /exit, /q     Exit cosync

Any other line is sent as a user message."#
        .to_string()
}
