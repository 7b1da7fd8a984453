//! Realtime chat client core.
//!
//! Keeps a local conversation store in sync with a chat server over three
//! independently reconnecting WebSocket channels (conversation, delivery
//! status, notifications), and performs outbound intents over them.

pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod session;
pub mod store;
pub mod sync;
pub mod terminal;
