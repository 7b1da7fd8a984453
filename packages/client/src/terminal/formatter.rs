//! Message formatting utilities for terminal display.

use kizuna_shared::time::to_local_clock_time;

use crate::domain::{ChannelKind, ChatState, ConnectionState, Conversation, Message, UserProfile};

const RULE: &str = "============================================================";

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the contact list shown after sign-in
    ///
    /// # Arguments
    ///
    /// * `contacts` - Users returned by the contact directory
    ///
    /// # Returns
    ///
    /// A formatted string with one contact per line
    pub fn format_contacts(contacts: &[UserProfile]) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\nContacts:\n", RULE));

        if contacts.is_empty() {
            output.push_str("(No contacts)\n");
        } else {
            for contact in contacts {
                let presence = if contact.is_online { "online" } else { "offline" };
                output.push_str(&format!(
                    "{} <{}> - {}\n",
                    contact.name, contact.mobile, presence
                ));
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    /// Format the conversation list with unread counters
    pub fn format_conversations(state: &ChatState) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\nConversations:\n", RULE));

        if state.conversations.is_empty() {
            output.push_str("(No conversations)\n");
        } else {
            for conversation in &state.conversations {
                let active = state.active_chat_id.as_deref() == Some(conversation.id.as_str());
                let marker = if active { "*" } else { " " };
                let preview = conversation
                    .last_message
                    .as_ref()
                    .map(|message| message.content.as_str())
                    .unwrap_or("");
                output.push_str(&format!(
                    "{} {} [{}] ({} unread) {}\n",
                    marker,
                    conversation.name,
                    conversation.id,
                    state.unread(&conversation.id),
                    preview
                ));
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    /// Format one chat message.
    ///
    /// Messages sent by `self_id` are labelled `me` and show their delivery status.
    pub fn format_message(
        message: &Message,
        conversation: Option<&Conversation>,
        self_id: &str,
    ) -> String {
        let time = to_local_clock_time(&message.timestamp);
        if message.sender_id == self_id {
            return format!(
                "\n[{}] @me: {} ({}, id {})\n",
                time,
                message.content,
                message.status.as_str(),
                message.id
            );
        }

        let sender = conversation
            .and_then(|conversation| {
                conversation
                    .participants
                    .iter()
                    .find(|participant| {
                        participant.id.as_deref() == Some(message.sender_id.as_str())
                    })
            })
            .map(|participant| participant.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(message.sender_id.as_str());
        let attachment = message
            .file_url
            .as_deref()
            .map(|url| format!(" [{}: {}]", message.message_type.as_str(), url))
            .unwrap_or_default();

        format!(
            "\n[{}] @{}: {}{} (id {})\n",
            time, sender, message.content, attachment, message.id
        )
    }

    pub fn format_typing(names: &[String]) -> String {
        match names {
            [] => String::new(),
            [name] => format!("\n{} is typing...\n", name),
            names => format!("\n{} are typing...\n", names.join(", ")),
        }
    }

    pub fn format_unread(conversation_name: &str, count: u32) -> String {
        format!("\n* {} ({} unread)\n", conversation_name, count)
    }

    pub fn format_connection_state(kind: ChannelKind, state: ConnectionState) -> String {
        format!("\n~ {} channel: {}\n", kind, state)
    }

    pub fn format_error(error: &dyn std::error::Error) -> String {
        format!("\n! {}\n", error)
    }
}
