//! WebSocket event DTOs.
//!
//! Every event is a JSON object with a `type` discriminator. Outbound events
//! share one enum; inbound events have one enum per channel, each with an
//! `Unknown` arm so new server event types are ignored instead of failing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::ChannelKind;

/// An id that the server may send as a string or a number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    /// Encode a user id, as a number when it is numeric.
    pub fn from_user_id(id: &str) -> Self {
        match id.parse::<i64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(id.to_string()),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text,
        }
    }
}

// ========================================
// Outbound
// ========================================

/// Sender profile embedded in `send_message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderDto {
    pub id: WireId,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub profile_pic: Option<String>,
    pub is_online: bool,
}

/// Events sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Authenticate {
        token: String,
        user_id: WireId,
    },
    JoinChat {
        chat_id: String,
        room_id: String,
        user_id: WireId,
    },
    LeaveChat {
        chat_id: String,
        room_id: String,
        user_id: WireId,
    },
    SendMessage {
        chat_id: String,
        room_id: String,
        content: String,
        message_type: String,
        user_id: WireId,
        sender: SenderDto,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    Typing {
        chat_id: String,
        room_id: String,
        user_id: WireId,
        user_name: String,
    },
    StopTyping {
        chat_id: String,
        room_id: String,
        user_id: WireId,
        user_name: String,
    },
    MarkRead {
        chat_id: String,
        room_id: String,
        message_id: WireId,
        user_id: WireId,
    },
}

impl OutboundEvent {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::JoinChat { .. } => "join_chat",
            Self::LeaveChat { .. } => "leave_chat",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stop_typing",
            Self::MarkRead { .. } => "mark_read",
        }
    }
}

// ========================================
// Inbound: shared payloads
// ========================================

/// A user object as sent by the server; every field is optional
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UserDto {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
}

/// Either a full sender profile or a bare id
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SenderRefDto {
    Profile(UserDto),
    Id(WireId),
}

/// A message as sent by the server
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MessageDto {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<WireId>,
    #[serde(default)]
    pub sender: Option<SenderRefDto>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub read_by: Vec<WireId>,
}

/// Payload of `typing` / `stop_typing`
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TypingDto {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<WireId>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub typing_users: Option<Vec<String>>,
}

/// `last_message` of a notification
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NotificationMessageDto {
    #[serde(default, alias = "room_id")]
    pub chat_id: String,
    #[serde(default)]
    pub sender: Option<SenderRefDto>,
    #[serde(default, alias = "content")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ========================================
// Inbound: per-channel events
// ========================================

/// Events on the conversation channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationInbound {
    OldMessages {
        #[serde(default)]
        messages: Vec<MessageDto>,
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        room_id: Option<String>,
    },
    NewMessage {
        message: MessageDto,
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        room_id: Option<String>,
    },
    Typing(TypingDto),
    StopTyping(TypingDto),
    /// Legacy read receipt
    MessageRead {
        message_id: WireId,
        #[serde(default)]
        read_by: Vec<WireId>,
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        room_id: Option<String>,
    },
    ReceiverInfo {
        #[serde(default, alias = "user", alias = "receiver_info")]
        receiver: Option<UserDto>,
    },
    AuthenticateResponse {
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Events on the delivery-status channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusInbound {
    MessageStatusUpdate {
        message_id: WireId,
        status: String,
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        room_id: Option<String>,
    },
    UserOnline {
        #[serde(default)]
        online_users: Vec<String>,
    },
    UserOffline {
        #[serde(default)]
        online_users: Vec<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Events on the notification channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationInbound {
    Notification { last_message: NotificationMessageDto },
    #[serde(other)]
    Unknown,
}

/// A decoded inbound event, tagged with its channel
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Conversation(ConversationInbound),
    Status(StatusInbound),
    Notification(NotificationInbound),
}

/// Decode an inbound text frame for the given channel.
///
/// The frame is parsed as a JSON value first so the `type` can be logged
/// even when the typed decode fails.
pub fn decode_inbound(kind: ChannelKind, text: &str) -> Result<InboundEvent, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>");
    debug!("Received '{}' on the {} channel", event_type, kind);

    let event = match kind {
        ChannelKind::Conversation => InboundEvent::Conversation(serde_json::from_value(value)?),
        ChannelKind::DeliveryStatus => InboundEvent::Status(serde_json::from_value(value)?),
        ChannelKind::Notification => InboundEvent::Notification(serde_json::from_value(value)?),
    };
    Ok(event)
}

/// Accept RFC 3339, naive ISO 8601 (as UTC) or epoch milliseconds.
///
/// Unparseable values decode to `None` so the caller can fall back to its clock.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|datetime| datetime.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(number) => number
            .as_i64()
            .and_then(kizuna_shared::time::millis_to_datetime),
        _ => None,
    }
}
