use std::path::Path;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use super::command::{Command, Reply};
use super::synchronizer::OutboundIntent;
use crate::domain::{
    ChannelStates, ChatState, Conversation, FileUploader, MessageDraft, MessageId, MessageType,
    UserProfile,
};
use crate::error::SyncError;

/// Cloneable handle to a running synchronizer.
///
/// Every method is answered by the synchronizer task; once that task has
/// stopped they fail with [`SyncError::Stopped`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChatState>,
    connections: watch::Receiver<ChannelStates>,
}

impl SyncHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<ChatState>,
        connections: watch::Receiver<ChannelStates>,
    ) -> Self {
        Self {
            commands,
            state,
            connections,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SyncError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| SyncError::Stopped)?;
        response.await.map_err(|_| SyncError::Stopped)
    }

    async fn outbound(&self, intent: OutboundIntent) -> Result<(), SyncError> {
        self.request(|reply| Command::Outbound { intent, reply })
            .await?
    }

    /// Snapshot-able view of the conversation store
    pub fn state(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    pub fn connection_states(&self) -> watch::Receiver<ChannelStates> {
        self.connections.clone()
    }

    // ========================================
    // Outbound intents
    // ========================================

    /// Send a message to the active conversation
    pub async fn send_chat_message(&self, draft: MessageDraft) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::ChatMessage(draft)).await
    }

    pub async fn send_text(&self, content: impl Into<String>) -> Result<(), SyncError> {
        self.send_chat_message(MessageDraft::text(content)).await
    }

    /// Report a keystroke; `stop_typing` follows automatically after a quiet period
    pub async fn send_typing(&self) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::Typing).await
    }

    pub async fn send_stop_typing(&self) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::StopTyping).await
    }

    pub async fn mark_read(&self, message_id: MessageId) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::MarkRead(message_id)).await
    }

    pub async fn join_conversation(&self, chat_id: impl Into<String>) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::Join(chat_id.into())).await
    }

    pub async fn leave_conversation(&self, chat_id: impl Into<String>) -> Result<(), SyncError> {
        self.outbound(OutboundIntent::Leave(chat_id.into())).await
    }

    /// Upload a file, then send it as a message to the active conversation.
    ///
    /// The message type is inferred from the file extension.
    pub async fn send_file(
        &self,
        uploader: &dyn FileUploader,
        path: &Path,
        caption: Option<String>,
    ) -> Result<(), SyncError> {
        let file_url = uploader.upload(path).await.map_err(|e| {
            warn!("Upload of {} failed: {}", path.display(), e);
            SyncError::Upload(e.to_string())
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let draft = MessageDraft {
            content: caption.unwrap_or_else(|| file_name.clone()),
            message_type: MessageType::from_file_name(&file_name),
            file_url: Some(file_url),
            file_name: Some(file_name),
        };
        self.send_chat_message(draft).await
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Switch the active conversation, rebinding the per-conversation channels
    pub async fn set_active_chat(&self, chat_id: Option<String>) -> Result<(), SyncError> {
        self.request(|reply| Command::SetActiveChat { chat_id, reply })
            .await
    }

    /// Create the one-to-one conversation with `contact` if needed and make it active
    pub async fn open_direct_chat(&self, contact: UserProfile) -> Result<String, SyncError> {
        self.request(|reply| Command::OpenDirectChat { contact, reply })
            .await?
    }

    pub async fn add_conversation(&self, conversation: Conversation) -> Result<(), SyncError> {
        self.request(|reply| Command::AddConversation {
            conversation,
            reply,
        })
        .await
    }

    /// Merge a conversation list fetched out of band into the store
    pub async fn load_conversations(
        &self,
        conversations: Vec<Conversation>,
    ) -> Result<(), SyncError> {
        self.request(|reply| Command::LoadConversations {
            conversations,
            reply,
        })
        .await
    }

    pub async fn reconnect_all(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::ReconnectAll { reply }).await
    }

    /// Close every channel and stop the synchronizer task
    pub async fn shutdown(&self) {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) => info!("Synchronizer shut down"),
            Err(_) => info!("Synchronizer was already stopped"),
        }
    }
}
