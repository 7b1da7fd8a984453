//! Reconnect policy for channel connections.
//!
//! Pure functions only: the channel driver asks the policy whether and when to
//! retry, the policy never sleeps itself.

use std::time::Duration;

/// WebSocket close code for a normal, intentional closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Why a channel's socket went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The local caller asked for the teardown
    Requested,
    /// The peer sent a close frame (or the stream ended without one)
    ClosedByPeer { code: Option<u16> },
    /// Connect, read or write failure
    Error(String),
}

impl DisconnectReason {
    /// Whether the close was intentional and must not be retried.
    pub fn is_intentional(&self) -> bool {
        match self {
            Self::Requested => true,
            Self::ClosedByPeer { code } => *code == Some(NORMAL_CLOSURE),
            Self::Error(_) => false,
        }
    }
}

/// Exponential backoff with a cap and a bounded attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the retry numbered `attempt` (0-indexed):
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Check if another reconnect should be scheduled.
    ///
    /// # Arguments
    ///
    /// * `reason` - Why the socket went away
    /// * `current_attempt` - Retries already scheduled since the last successful open
    pub fn should_attempt_reconnect(&self, reason: &DisconnectReason, current_attempt: u32) -> bool {
        // Intentional closes never retry
        if reason.is_intentional() {
            return false;
        }

        current_attempt < self.max_attempts
    }
}
