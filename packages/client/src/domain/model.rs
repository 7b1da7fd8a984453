//! Domain models for conversations, participants and messages.

use std::fmt;

use chrono::{DateTime, Utc};

/// Identifier of a message.
///
/// Servers issue either numeric or string ids; both are preserved as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Number(i64),
    Text(String),
}

impl MessageId {
    /// Parse user input, preferring the numeric form when it fits.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Kind of message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Audio,
}

impl MessageType {
    /// Wire name of the message type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
        }
    }

    /// Parse a wire name; unknown names degrade to `Text`.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "file" => Self::File,
            "audio" => Self::Audio,
            _ => Self::Text,
        }
    }

    /// Infer the message type of an attachment from its file name.
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" | "heic" => Self::Image,
            "mp3" | "wav" | "ogg" | "m4a" | "aac" | "flac" | "opus" | "webm" => Self::Audio,
            _ => Self::File,
        }
    }
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "Sent",
            Self::Delivered => "Delivered",
            Self::Read => "Read",
        }
    }

    /// Parse a wire name (case-insensitive).
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// A chat message, owned by exactly one conversation via `chat_id`
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub is_read: bool,
    pub read_by: Vec<String>,
}

impl Message {
    /// Create a plain text message with default delivery fields
    pub fn text(
        id: impl Into<MessageId>,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            message_type: MessageType::Text,
            file_url: None,
            file_name: None,
            timestamp,
            status: MessageStatus::Sent,
            is_read: false,
            read_by: Vec::new(),
        }
    }

    /// Merge the fields carried by `patch` into this message
    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(is_read) = patch.is_read {
            self.is_read = is_read;
        }
        if let Some(read_by) = &patch.read_by {
            self.read_by = read_by.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
    }
}

/// Partial update of a message, matched by id
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePatch {
    pub id: MessageId,
    pub status: Option<MessageStatus>,
    pub is_read: Option<bool>,
    pub read_by: Option<Vec<String>>,
    pub content: Option<String>,
}

impl MessagePatch {
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            status: None,
            is_read: None,
            read_by: None,
            content: None,
        }
    }

    /// Status change with the derived read flag (`is_read == (status == Read)`)
    pub fn status(id: MessageId, status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            is_read: Some(status == MessageStatus::Read),
            ..Self::new(id)
        }
    }

    pub fn read_by(id: MessageId, read_by: Vec<String>) -> Self {
        Self {
            read_by: Some(read_by),
            ..Self::new(id)
        }
    }
}

/// A conversation participant.
///
/// `id` is `None` while unresolved (e.g. synthesized from a notification);
/// that is a valid, stable state until an explicit fetch supplies it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Participant {
    pub id: Option<String>,
    pub name: String,
    pub mobile: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
}

impl Participant {
    /// Participant whose internal id is not known yet
    pub fn unresolved(name: impl Into<String>, mobile: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            mobile: mobile.into(),
            avatar_url: None,
            is_online: false,
        }
    }

    /// Whether `other` describes the same person.
    ///
    /// Matches on `id` when both sides carry one, otherwise on `mobile`.
    pub fn same_person(&self, other: &Participant) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => !self.mobile.is_empty() && self.mobile == other.mobile,
        }
    }
}

impl From<&UserProfile> for Participant {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: Some(user.id.clone()),
            name: user.name.clone(),
            mobile: user.mobile.clone(),
            avatar_url: user.profile_pic.clone(),
            is_online: user.is_online,
        }
    }
}

/// A conversation (1:1 or group)
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub participants: Vec<Participant>,
    pub is_group: bool,
    pub avatar_url: Option<String>,
    pub last_message: Option<Message>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh one-to-one conversation between `me` and `other`
    pub fn direct(
        id: impl Into<String>,
        me: &UserProfile,
        other: &UserProfile,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: other.name.clone(),
            participants: vec![Participant::from(me), Participant::from(other)],
            is_group: false,
            avatar_url: other.profile_pic.clone(),
            last_message: None,
            updated_at: created_at,
            created_at,
        }
    }

    /// Merge the fields carried by `patch` into this conversation
    pub fn apply(&mut self, patch: &ConversationPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(participants) = &patch.participants {
            self.participants = participants.clone();
        }
        if let Some(is_group) = patch.is_group {
            self.is_group = is_group;
        }
        if let Some(avatar_url) = &patch.avatar_url {
            self.avatar_url = avatar_url.clone();
        }
        if let Some(last_message) = &patch.last_message {
            self.last_message = Some(last_message.clone());
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }

    /// Upsert `incoming` into the participant list (last write wins).
    pub fn reconcile_participant(&mut self, incoming: Participant) {
        match self
            .participants
            .iter_mut()
            .find(|existing| existing.same_person(&incoming))
        {
            Some(existing) => *existing = incoming,
            None => self.participants.push(incoming),
        }
    }
}

/// Partial update of a conversation, matched by id
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationPatch {
    pub id: String,
    pub name: Option<String>,
    pub participants: Option<Vec<Participant>>,
    pub is_group: Option<bool>,
    pub avatar_url: Option<Option<String>>,
    pub last_message: Option<Message>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            participants: None,
            is_group: None,
            avatar_url: None,
            last_message: None,
            updated_at: None,
        }
    }

    /// Patch setting `last_message` and `updated_at` from `message`
    pub fn last_message(id: impl Into<String>, message: Message) -> Self {
        Self {
            updated_at: Some(message.timestamp),
            last_message: Some(message),
            ..Self::new(id)
        }
    }
}

/// The signed-in user's profile
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub profile_pic: Option<String>,
    pub is_online: bool,
}

/// Current user plus bearer credential
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user: UserProfile,
    pub access_token: String,
}

/// An outbound chat message before it is put on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            file_url: None,
            file_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kizuna_shared::time::millis_to_datetime;

    fn at(millis: i64) -> DateTime<Utc> {
        millis_to_datetime(millis).unwrap()
    }

    #[test]
    fn test_message_id_parse_prefers_number() {
        // テスト項目: 数値として解釈できる ID は数値になる
        // given (前提条件):
        let numeric = " 42 ";
        let textual = "msg-42";

        // when (操作):
        let a = MessageId::parse(numeric);
        let b = MessageId::parse(textual);

        // then (期待する結果):
        assert_eq!(a, MessageId::Number(42));
        assert_eq!(b, MessageId::Text("msg-42".to_string()));
        assert_eq!(b.to_string(), "msg-42");
    }

    #[test]
    fn test_message_type_from_file_name() {
        // テスト項目: ファイル名の拡張子からメッセージ種別が推定される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(MessageType::from_file_name("cat.JPG"), MessageType::Image);
        assert_eq!(MessageType::from_file_name("memo.m4a"), MessageType::Audio);
        assert_eq!(MessageType::from_file_name("report.pdf"), MessageType::File);
        assert_eq!(MessageType::from_file_name("README"), MessageType::File);
    }

    #[test]
    fn test_message_status_from_wire_is_case_insensitive() {
        // テスト項目: ステータス名は大文字小文字を区別せずに解釈される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(MessageStatus::from_wire("Read"), Some(MessageStatus::Read));
        assert_eq!(
            MessageStatus::from_wire("delivered"),
            Some(MessageStatus::Delivered)
        );
        assert_eq!(MessageStatus::from_wire("seen"), None);
    }

    #[test]
    fn test_status_patch_derives_read_flag() {
        // テスト項目: ステータス更新で既読フラグが導出される
        // given (前提条件):
        let mut message = Message::text(1_i64, "chat", "111", "hi", at(1_000));

        // when (操作):
        message.apply(&MessagePatch::status(
            MessageId::Number(1),
            MessageStatus::Read,
        ));

        // then (期待する結果):
        assert_eq!(message.status, MessageStatus::Read);
        assert!(message.is_read);

        // when (操作): Delivered に戻すと既読フラグも落ちる
        message.apply(&MessagePatch::status(
            MessageId::Number(1),
            MessageStatus::Delivered,
        ));

        // then (期待する結果):
        assert!(!message.is_read);
    }

    #[test]
    fn test_reconcile_participant_by_mobile_resolves_id() {
        // テスト項目: ID 未解決の参加者が携帯番号で照合され、ID が補完される
        // given (前提条件):
        let mut conversation = Conversation {
            id: "chat_111_with_222".to_string(),
            name: "Bob".to_string(),
            participants: vec![Participant::unresolved("Bob", "222")],
            is_group: false,
            avatar_url: None,
            last_message: None,
            updated_at: at(0),
            created_at: at(0),
        };
        let resolved = Participant {
            id: Some("7".to_string()),
            ..Participant::unresolved("Bob", "222")
        };

        // when (操作):
        conversation.reconcile_participant(resolved.clone());

        // then (期待する結果):
        assert_eq!(conversation.participants, vec![resolved]);
    }

    #[test]
    fn test_reconcile_participant_appends_unknown_person() {
        // テスト項目: 一致する参加者がいない場合は追加される
        // given (前提条件):
        let me = UserProfile {
            id: "1".to_string(),
            name: "Alice".to_string(),
            mobile: "111".to_string(),
            ..UserProfile::default()
        };
        let bob = UserProfile {
            id: "2".to_string(),
            name: "Bob".to_string(),
            mobile: "222".to_string(),
            ..UserProfile::default()
        };
        let mut conversation = Conversation::direct("chat_111_with_222", &me, &bob, at(0));
        let carol = Participant::unresolved("Carol", "333");

        // when (操作):
        conversation.reconcile_participant(carol.clone());

        // then (期待する結果):
        assert_eq!(conversation.participants.len(), 3);
        assert_eq!(conversation.participants[2], carol);
    }
}
