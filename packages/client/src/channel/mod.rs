//! Reconnecting channel connections.
//!
//! One generic [`ChannelConnection`] is instantiated per logical channel
//! (conversation, delivery-status, notification). Each connection owns a
//! driver task that opens the socket, sends the greeting, forwards decoded
//! inbound events and retries with exponential backoff.

pub mod connection;
pub mod endpoint;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ChannelConnection, ChannelEvent, ChannelPayload, ChannelSpec};
pub use endpoint::channel_url;
