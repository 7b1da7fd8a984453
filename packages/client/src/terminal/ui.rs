//! UI utilities for the terminal.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use super::formatter::MessageFormatter;
use crate::domain::ChatState;

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}

/// What has already been printed, so each store snapshot only prints the difference.
#[derive(Debug, Default)]
pub struct ScreenView {
    self_id: String,
    printed: HashMap<String, HashSet<String>>,
    typing: Vec<String>,
    unread: HashMap<String, u32>,
}

impl ScreenView {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            ..Self::default()
        }
    }

    /// Render the output caused by moving to `state`
    pub fn render(&mut self, state: &ChatState) -> String {
        let mut output = String::new();

        if let Some(chat_id) = state.active_chat_id.as_deref() {
            let conversation = state.conversation(chat_id);
            let printed = self.printed.entry(chat_id.to_string()).or_default();
            for message in state.messages(chat_id) {
                // status changes re-print own messages once per status
                let key = format!("{}:{}", message.id, message.status.as_str());
                if printed.insert(key) {
                    output.push_str(&MessageFormatter::format_message(
                        message,
                        conversation,
                        &self.self_id,
                    ));
                }
            }

            let typing = state.typing(chat_id);
            if typing != self.typing.as_slice() {
                output.push_str(&MessageFormatter::format_typing(typing));
                self.typing = typing.to_vec();
            }
        } else {
            self.typing.clear();
        }

        for conversation in &state.conversations {
            let count = state.unread(&conversation.id);
            let previous = self.unread.insert(conversation.id.clone(), count).unwrap_or(0);
            if count > previous {
                output.push_str(&MessageFormatter::format_unread(&conversation.name, count));
            }
        }

        output
    }
}
