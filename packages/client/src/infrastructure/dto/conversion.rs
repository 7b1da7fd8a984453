//! Conversion logic between DTOs and domain models.

use kizuna_shared::time::Clock;

use crate::domain::{
    AuthGrant, Identity, Message, MessageDraft, MessageId, MessageStatus, MessageType,
    NotificationPreview, Participant, TokenPair, UserProfile,
};
use crate::infrastructure::dto::http as http_dto;
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain
// ========================================

impl From<dto::WireId> for MessageId {
    fn from(id: dto::WireId) -> Self {
        match id {
            dto::WireId::Number(number) => Self::Number(number),
            dto::WireId::Text(text) => Self::Text(text),
        }
    }
}

impl From<dto::UserDto> for UserProfile {
    fn from(dto: dto::UserDto) -> Self {
        Self {
            id: dto.id.map(dto::WireId::into_string).unwrap_or_default(),
            name: dto.name.unwrap_or_default(),
            email: dto.email.unwrap_or_default(),
            mobile: dto.mobile.unwrap_or_default(),
            profile_pic: dto.profile_pic,
            // Only an explicit `false` means offline
            is_online: dto.is_online.unwrap_or(true),
        }
    }
}

impl From<dto::UserDto> for Participant {
    fn from(dto: dto::UserDto) -> Self {
        Self {
            id: dto.id.map(dto::WireId::into_string),
            name: dto.name.unwrap_or_default(),
            mobile: dto.mobile.unwrap_or_default(),
            avatar_url: dto.profile_pic,
            is_online: dto.is_online.unwrap_or(true),
        }
    }
}

impl From<http_dto::TokenPairDto> for TokenPair {
    fn from(dto: http_dto::TokenPairDto) -> Self {
        Self {
            access: dto.access,
            refresh: dto.refresh,
        }
    }
}

impl dto::SenderRefDto {
    fn id(&self) -> Option<String> {
        match self {
            Self::Profile(user) => user.id.clone().map(dto::WireId::into_string),
            Self::Id(id) => Some(id.clone().into_string()),
        }
    }
}

impl dto::MessageDto {
    /// Chat id carried by the message itself, if any
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref().or(self.room_id.as_deref())
    }

    /// Convert to a domain message.
    ///
    /// `fallback_chat_id` is used when the message carries no chat id; missing
    /// timestamps are taken from `clock`.
    pub fn into_message(self, fallback_chat_id: &str, clock: &dyn Clock) -> Message {
        let chat_id = self.chat_id().unwrap_or(fallback_chat_id).to_string();
        let timestamp = self.timestamp.unwrap_or_else(|| clock.now());
        let sender_id = self
            .sender_id
            .map(dto::WireId::into_string)
            .or_else(|| self.sender.as_ref().and_then(dto::SenderRefDto::id))
            .unwrap_or_default();
        let id = match self.id {
            Some(id) => MessageId::from(id),
            None => MessageId::Text(format!("{}-{}", chat_id, timestamp.timestamp_millis())),
        };
        let status = self
            .status
            .as_deref()
            .and_then(MessageStatus::from_wire)
            .unwrap_or_default();

        Message {
            id,
            chat_id,
            sender_id,
            content: self.content,
            message_type: self
                .message_type
                .as_deref()
                .map(MessageType::from_wire)
                .unwrap_or_default(),
            file_url: self.file_url,
            file_name: self.file_name,
            timestamp,
            is_read: self.is_read.unwrap_or(status == MessageStatus::Read),
            status,
            read_by: self
                .read_by
                .into_iter()
                .map(dto::WireId::into_string)
                .collect(),
        }
    }
}

impl dto::TypingDto {
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref().or(self.room_id.as_deref())
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.clone().map(dto::WireId::into_string)
    }

    /// Typist names: the explicit list, else the single sender name
    pub fn names(&self) -> Vec<String> {
        match (&self.typing_users, &self.user_name) {
            (Some(users), _) => users.clone(),
            (None, Some(name)) => vec![name.clone()],
            (None, None) => Vec::new(),
        }
    }
}

impl dto::NotificationMessageDto {
    pub fn into_preview(self, clock: &dyn Clock) -> NotificationPreview {
        let (sender_id, sender_name, sender_mobile) = match self.sender {
            Some(dto::SenderRefDto::Profile(user)) => (
                user.id.map(dto::WireId::into_string),
                user.name.unwrap_or_default(),
                user.mobile,
            ),
            Some(dto::SenderRefDto::Id(id)) => (Some(id.into_string()), String::new(), None),
            None => (None, String::new(), None),
        };

        NotificationPreview {
            chat_id: self.chat_id,
            sender_id,
            sender_name,
            sender_mobile,
            text: self.text,
            timestamp: self.timestamp.unwrap_or_else(|| clock.now()),
        }
    }
}

impl http_dto::AuthResponse {
    /// Unwrap a successful auth envelope
    pub fn into_grant(self) -> Result<AuthGrant, String> {
        let fallback = || "Authentication failed".to_string();
        if !self.status {
            return Err(self.message.unwrap_or_else(fallback));
        }
        match (self.token, self.data) {
            (Some(tokens), Some(user)) => Ok(AuthGrant {
                tokens: tokens.into(),
                user: user.into(),
            }),
            _ => Err(self.message.unwrap_or_else(fallback)),
        }
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<&MessageId> for dto::WireId {
    fn from(id: &MessageId) -> Self {
        match id {
            MessageId::Number(number) => Self::Number(*number),
            MessageId::Text(text) => Self::Text(text.clone()),
        }
    }
}

impl From<&UserProfile> for dto::SenderDto {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: dto::WireId::from_user_id(&user.id),
            name: user.name.clone(),
            email: user.email.clone(),
            mobile: user.mobile.clone(),
            profile_pic: user.profile_pic.clone(),
            is_online: user.is_online,
        }
    }
}

impl dto::OutboundEvent {
    pub fn authenticate(identity: &Identity) -> Self {
        Self::Authenticate {
            token: identity.access_token.clone(),
            user_id: dto::WireId::from_user_id(&identity.user.id),
        }
    }

    pub fn join_chat(chat_id: &str, user: &UserProfile) -> Self {
        Self::JoinChat {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            user_id: dto::WireId::from_user_id(&user.id),
        }
    }

    pub fn leave_chat(chat_id: &str, user: &UserProfile) -> Self {
        Self::LeaveChat {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            user_id: dto::WireId::from_user_id(&user.id),
        }
    }

    pub fn send_message(chat_id: &str, user: &UserProfile, draft: &MessageDraft) -> Self {
        Self::SendMessage {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            content: draft.content.clone(),
            message_type: draft.message_type.as_str().to_string(),
            user_id: dto::WireId::from_user_id(&user.id),
            sender: user.into(),
            file_url: draft.file_url.clone(),
            file_name: draft.file_name.clone(),
        }
    }

    pub fn typing(chat_id: &str, user: &UserProfile) -> Self {
        Self::Typing {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            user_id: dto::WireId::from_user_id(&user.id),
            user_name: user.name.clone(),
        }
    }

    pub fn stop_typing(chat_id: &str, user: &UserProfile) -> Self {
        Self::StopTyping {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            user_id: dto::WireId::from_user_id(&user.id),
            user_name: user.name.clone(),
        }
    }

    pub fn mark_read(chat_id: &str, message_id: &MessageId, user: &UserProfile) -> Self {
        Self::MarkRead {
            chat_id: chat_id.to_string(),
            room_id: chat_id.to_string(),
            message_id: message_id.into(),
            user_id: dto::WireId::from_user_id(&user.id),
        }
    }
}
