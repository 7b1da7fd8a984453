//! Domain layer of the chat client.
//!
//! Pure data types and pure functions: conversation/message models, the
//! canonical chat identifier, the state reducer, reconnect policy and the
//! typing expiry tracker. Interfaces to the outside world (socket transport,
//! auth, contacts, uploads) are declared here as traits and implemented by the
//! infrastructure layer.

pub mod backoff;
pub mod channel;
pub mod chat_id;
pub mod gateway;
pub mod model;
pub mod notification;
pub mod state;
pub mod transport;
pub mod typing;

pub use backoff::{DisconnectReason, ReconnectPolicy};
pub use channel::{ChannelKind, ChannelStates, ConnectionState};
pub use chat_id::{canonical_id, counterpart};
pub use gateway::{
    AuthGateway, AuthGrant, ContactDirectory, FileUploader, ProfileUpdate, Registration,
    TokenPair, online_contacts,
};
pub use model::{
    Conversation, ConversationPatch, Identity, Message, MessageDraft, MessageId, MessagePatch,
    MessageStatus, MessageType, Participant, UserProfile,
};
pub use notification::{NotificationPreview, synthesize_conversation};
pub use state::{ChatState, StoreAction};
pub use transport::{Frame, Socket, Transport};
pub use typing::TypingTracker;
