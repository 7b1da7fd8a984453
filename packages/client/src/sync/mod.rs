//! Channel manager / synchronizer.
//!
//! A single actor task owns the conversation store, the three channel
//! connections and the typing timers. [`SyncHandle`] is the cloneable front
//! door: outbound intents and lifecycle requests travel over a command queue
//! and are answered over oneshot channels.

mod command;
pub mod handle;
pub mod synchronizer;

pub use handle::SyncHandle;
pub use synchronizer::{OutboundIntent, Synchronizer};
