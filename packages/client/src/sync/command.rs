use tokio::sync::oneshot;

use super::synchronizer::OutboundIntent;
use crate::domain::{Conversation, UserProfile};
use crate::error::SyncError;

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Requests processed by the synchronizer task
#[derive(Debug)]
pub(crate) enum Command {
    Outbound {
        intent: OutboundIntent,
        reply: Reply<Result<(), SyncError>>,
    },
    SetActiveChat {
        chat_id: Option<String>,
        reply: Reply<()>,
    },
    OpenDirectChat {
        contact: UserProfile,
        reply: Reply<Result<String, SyncError>>,
    },
    AddConversation {
        conversation: Conversation,
        reply: Reply<()>,
    },
    LoadConversations {
        conversations: Vec<Conversation>,
        reply: Reply<()>,
    },
    ReconnectAll {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}
