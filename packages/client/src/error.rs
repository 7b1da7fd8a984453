//! Error types for the chat client core.
//!
//! None of these are fatal: transport errors drive reconnects, sync errors are
//! returned to the caller of an outbound intent, gateway errors surface to the
//! session or the terminal front-end.

use thiserror::Error;

use crate::domain::ChannelKind;

/// Errors building or operating a channel connection
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No bearer credential is available
    #[error("No credential available for the {0} channel")]
    MissingCredential(ChannelKind),

    /// The conversation channel needs a target conversation id
    #[error("No conversation id for the {0} channel")]
    MissingConversation(ChannelKind),

    /// The endpoint URL could not be built
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The channel is not in the `connected` state
    #[error("The {0} channel is not connected")]
    NotConnected(ChannelKind),

    /// The outbound event could not be encoded
    #[error("Failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Socket-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connect(String),

    /// Failed to write a frame
    #[error("Send error: {0}")]
    Send(String),

    /// Protocol or read error
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Failure of an outbound intent
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Not signed in")]
    NoIdentity,

    #[error("No active conversation")]
    NoActiveConversation,

    #[error("The {0} channel is not connected")]
    NotConnected(ChannelKind),

    /// The synchronizer task has stopped
    #[error("Synchronizer is not running")]
    Stopped,

    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Errors from HTTP collaborators
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// The server answered with `status: false` and a message
    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Errors from the credential/profile session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
