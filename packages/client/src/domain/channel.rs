//! Channel kinds and their connection states.

use std::fmt;

/// One of the three logical socket channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Per-conversation events (messages, typing)
    Conversation,
    /// Delivery/read receipts and presence
    DeliveryStatus,
    /// Out-of-band notifications for any conversation
    Notification,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Conversation,
        ChannelKind::DeliveryStatus,
        ChannelKind::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::DeliveryStatus => "delivery-status",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Snapshot of all three channel states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStates {
    pub conversation: ConnectionState,
    pub delivery_status: ConnectionState,
    pub notification: ConnectionState,
}

impl ChannelStates {
    pub fn get(&self, kind: ChannelKind) -> ConnectionState {
        match kind {
            ChannelKind::Conversation => self.conversation,
            ChannelKind::DeliveryStatus => self.delivery_status,
            ChannelKind::Notification => self.notification,
        }
    }

    pub fn set(&mut self, kind: ChannelKind, state: ConnectionState) {
        match kind {
            ChannelKind::Conversation => self.conversation = state,
            ChannelKind::DeliveryStatus => self.delivery_status = state,
            ChannelKind::Notification => self.notification = state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_states_set_only_touches_one_kind() {
        // テスト項目: 1 つのチャネル状態を更新しても他のチャネルは変わらない
        // given (前提条件):
        let mut states = ChannelStates::default();

        // when (操作):
        states.set(ChannelKind::DeliveryStatus, ConnectionState::Connected);

        // then (期待する結果):
        assert_eq!(
            states.get(ChannelKind::DeliveryStatus),
            ConnectionState::Connected
        );
        assert_eq!(
            states.get(ChannelKind::Conversation),
            ConnectionState::Disconnected
        );
        assert_eq!(
            states.get(ChannelKind::Notification),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_connection_state_display_is_lowercase() {
        // テスト項目: 接続状態の表示名が小文字になる
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ChannelKind::DeliveryStatus.to_string(), "delivery-status");
    }
}
