//! Notification previews and conversation synthesis.
//!
//! A notification may reference a conversation the client has never loaded.
//! In that case a minimal record is built from the canonical id; the other
//! participant's internal id stays `None` until an explicit fetch reconciles it.

use chrono::{DateTime, Utc};

use super::chat_id::counterpart;
use super::model::{Conversation, Message, MessageId, MessageStatus, MessageType, Participant};

/// The `last_message` payload of a notification event
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPreview {
    pub chat_id: String,
    pub sender_id: Option<String>,
    pub sender_name: String,
    pub sender_mobile: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationPreview {
    /// Message record standing in for the previewed message.
    ///
    /// Previews carry no message id; one is derived from the timestamp.
    pub fn to_message(&self) -> Message {
        Message {
            id: MessageId::Text(format!(
                "notification-{}",
                self.timestamp.timestamp_millis()
            )),
            chat_id: self.chat_id.clone(),
            sender_id: self
                .sender_id
                .clone()
                .or_else(|| self.sender_mobile.clone())
                .unwrap_or_default(),
            content: self.text.clone(),
            message_type: MessageType::Text,
            file_url: None,
            file_name: None,
            timestamp: self.timestamp,
            status: MessageStatus::Delivered,
            is_read: false,
            read_by: Vec::new(),
        }
    }
}

/// Build a minimal conversation for a notification about an unknown chat.
///
/// For canonical 1:1 ids the other side's mobile is recovered from the id
/// itself. Anything else is treated as a group conversation.
pub fn synthesize_conversation(preview: &NotificationPreview, self_mobile: &str) -> Conversation {
    let sender_is_self = preview.sender_mobile.as_deref() == Some(self_mobile);
    let sender_name = (!preview.sender_name.is_empty() && !sender_is_self)
        .then(|| preview.sender_name.clone());

    let (name, participants, is_group) = match counterpart(&preview.chat_id, self_mobile) {
        Some(mobile) => {
            let name = sender_name.unwrap_or_else(|| mobile.clone());
            let participant = Participant::unresolved(name.clone(), mobile);
            (name, vec![participant], false)
        }
        None => {
            let participants = match (&sender_name, &preview.sender_mobile) {
                (Some(name), Some(mobile)) => vec![Participant::unresolved(name, mobile)],
                _ => Vec::new(),
            };
            (preview.chat_id.clone(), participants, true)
        }
    };

    Conversation {
        id: preview.chat_id.clone(),
        name,
        participants,
        is_group,
        avatar_url: None,
        last_message: Some(preview.to_message()),
        updated_at: preview.timestamp,
        created_at: preview.timestamp,
    }
}
