//! Parsing of terminal input lines.

use thiserror::Error;

use crate::domain::MessageId;

/// One line of terminal input
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalCommand {
    /// `/chat <mobile>`: open the direct conversation with a contact
    Chat(String),
    /// `/chats`: list conversations with unread counters
    Chats,
    /// `/typing`: send a typing indicator to the active conversation
    Typing,
    /// `/read <message-id>`
    Read(MessageId),
    /// `/reconnect`: retry every channel now
    Reconnect,
    /// `/quit`
    Quit,
    /// Any line not starting with `/`
    Send(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    MissingArgument(&'static str),

    #[error("Unknown command '{0}'. Commands: /chat <mobile>, /chats, /typing, /read <message-id>, /reconnect, /quit")]
    Unknown(String),
}

impl TerminalCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        match name {
            "chat" if argument.is_empty() => Err(CommandError::MissingArgument("/chat <mobile>")),
            "chat" => Ok(Self::Chat(argument.to_string())),
            "chats" => Ok(Self::Chats),
            "typing" => Ok(Self::Typing),
            "read" if argument.is_empty() => {
                Err(CommandError::MissingArgument("/read <message-id>"))
            }
            "read" => Ok(Self::Read(MessageId::parse(argument))),
            "reconnect" => Ok(Self::Reconnect),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(format!("/{}", other))),
        }
    }
}
