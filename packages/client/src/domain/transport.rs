//! Socket transport abstraction.
//!
//! The channel driver only needs text frames in and out plus the close code,
//! so the transport is reduced to that surface. The tokio-tungstenite
//! implementation lives in the infrastructure layer.

use async_trait::async_trait;

use crate::error::TransportError;

/// An inbound frame as seen by the channel driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Close frame with its code, if the peer sent one
    Close(Option<u16>),
    /// Ping, pong and binary frames; ignored by the driver
    Other,
}

/// An open socket
#[async_trait]
pub trait Socket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Factory for sockets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>, TransportError>;
}
