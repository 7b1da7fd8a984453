//! Conversation store state and its reducer.
//!
//! [`ChatState::apply`] is the only way state changes: old state plus an
//! action yields the new state. Every action is total; actions that reference
//! an unknown conversation or message leave the state untouched.

use std::collections::HashMap;

use super::model::{
    Conversation, ConversationPatch, Message, MessageId, MessagePatch, Participant,
};

/// One named store operation
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    SetConversations(Vec<Conversation>),
    /// No-op when the id is already present
    AddConversation(Conversation),
    /// Merge by id; never creates
    UpdateConversation(ConversationPatch),
    /// Upsert from an authoritative fetch
    ReconcileConversation(Conversation),
    ReconcileParticipant {
        chat_id: String,
        participant: Participant,
    },
    SetMessages {
        chat_id: String,
        messages: Vec<Message>,
    },
    AddMessage {
        chat_id: String,
        message: Message,
    },
    UpdateMessage {
        chat_id: String,
        patch: MessagePatch,
    },
    SetTypingUsers {
        chat_id: String,
        names: Vec<String>,
    },
    SetOnlineUsers(Vec<String>),
    IncrementUnread(String),
    ResetUnread(String),
    SetUnread {
        chat_id: String,
        count: u32,
    },
    /// Activating a conversation resets its unread counter
    SetActiveChat(Option<String>),
    Reset,
}

/// Snapshot of everything the client knows about its conversations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatState {
    pub active_chat_id: Option<String>,
    /// Most recently added first
    pub conversations: Vec<Conversation>,
    pub messages: HashMap<String, Vec<Message>>,
    pub typing_users: HashMap<String, Vec<String>>,
    pub online_users: Vec<String>,
    pub unread_counts: HashMap<String, u32>,
}

impl ChatState {
    pub fn conversation(&self, chat_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|conv| conv.id == chat_id)
    }

    pub fn messages(&self, chat_id: &str) -> &[Message] {
        self.messages.get(chat_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unread(&self, chat_id: &str) -> u32 {
        self.unread_counts.get(chat_id).copied().unwrap_or(0)
    }

    pub fn typing(&self, chat_id: &str) -> &[String] {
        self.typing_users
            .get(chat_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Find the conversation holding a message with the given id
    pub fn chat_of_message(&self, id: &MessageId) -> Option<&str> {
        self.messages
            .iter()
            .find(|(_, list)| list.iter().any(|message| &message.id == id))
            .map(|(chat_id, _)| chat_id.as_str())
            .or_else(|| {
                self.conversations
                    .iter()
                    .find(|conv| {
                        conv.last_message
                            .as_ref()
                            .is_some_and(|message| &message.id == id)
                    })
                    .map(|conv| conv.id.as_str())
            })
    }

    /// Apply one action and return the new state
    pub fn apply(mut self, action: StoreAction) -> Self {
        match action {
            StoreAction::SetConversations(conversations) => {
                self.conversations = conversations;
            }
            StoreAction::AddConversation(conversation) => {
                if self.conversation(&conversation.id).is_none() {
                    self.conversations.insert(0, conversation);
                }
            }
            StoreAction::UpdateConversation(patch) => {
                if let Some(existing) = self.conversation_mut(&patch.id) {
                    existing.apply(&patch);
                }
            }
            StoreAction::ReconcileConversation(incoming) => {
                self.reconcile_conversation(incoming);
            }
            StoreAction::ReconcileParticipant {
                chat_id,
                participant,
            } => {
                if let Some(existing) = self.conversation_mut(&chat_id) {
                    existing.reconcile_participant(participant);
                }
            }
            StoreAction::SetMessages { chat_id, mut messages } => {
                // sort_by_key is stable: ties keep arrival order
                messages.sort_by_key(|message| message.timestamp);
                self.messages.insert(chat_id, messages);
            }
            StoreAction::AddMessage { chat_id, message } => {
                self.add_message(chat_id, message);
            }
            StoreAction::UpdateMessage { chat_id, patch } => {
                self.update_message(&chat_id, &patch);
            }
            StoreAction::SetTypingUsers { chat_id, names } => {
                if names.is_empty() {
                    self.typing_users.remove(&chat_id);
                } else {
                    self.typing_users.insert(chat_id, names);
                }
            }
            StoreAction::SetOnlineUsers(names) => {
                self.online_users = names;
            }
            StoreAction::IncrementUnread(chat_id) => {
                let count = self.unread_counts.entry(chat_id).or_insert(0);
                *count = count.saturating_add(1);
            }
            StoreAction::ResetUnread(chat_id) => {
                self.unread_counts.insert(chat_id, 0);
            }
            StoreAction::SetUnread { chat_id, count } => {
                self.unread_counts.insert(chat_id, count);
            }
            StoreAction::SetActiveChat(chat_id) => {
                if let Some(id) = &chat_id {
                    self.unread_counts.insert(id.clone(), 0);
                }
                self.active_chat_id = chat_id;
            }
            StoreAction::Reset => {
                self = Self::default();
            }
        }
        self
    }

    fn conversation_mut(&mut self, chat_id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|conv| conv.id == chat_id)
    }

    fn reconcile_conversation(&mut self, incoming: Conversation) {
        let Some(existing) = self.conversation_mut(&incoming.id) else {
            self.conversations.insert(0, incoming);
            return;
        };

        let Conversation {
            name,
            participants,
            is_group,
            avatar_url,
            last_message,
            updated_at,
            created_at,
            ..
        } = incoming;

        existing.name = name;
        existing.is_group = is_group;
        existing.avatar_url = avatar_url;
        existing.created_at = created_at;
        if updated_at >= existing.updated_at {
            existing.updated_at = updated_at;
            if last_message.is_some() {
                existing.last_message = last_message;
            }
        }
        for participant in participants {
            existing.reconcile_participant(participant);
        }
    }

    fn add_message(&mut self, chat_id: String, message: Message) {
        let list = self.messages.entry(chat_id.clone()).or_default();
        match list.iter_mut().find(|existing| existing.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => list.push(message.clone()),
        }

        if let Some(conversation) = self.conversation_mut(&chat_id) {
            conversation.updated_at = message.timestamp;
            conversation.last_message = Some(message);
        }
    }

    fn update_message(&mut self, chat_id: &str, patch: &MessagePatch) {
        if let Some(list) = self.messages.get_mut(chat_id)
            && let Some(message) = list.iter_mut().find(|message| message.id == patch.id)
        {
            message.apply(patch);
        }

        if let Some(conversation) = self.conversation_mut(chat_id)
            && let Some(last) = conversation.last_message.as_mut()
            && last.id == patch.id
        {
            last.apply(patch);
        }
    }
}
