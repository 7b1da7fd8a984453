//! Client configuration.

use std::time::Duration;

use crate::domain::ReconnectPolicy;

/// Path templates for the three socket endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Conversation channel; `{chat_id}` is substituted
    pub conversation: String,
    pub delivery_status: String,
    pub notification: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            conversation: "/ws/chat/{chat_id}/".to_string(),
            delivery_status: "/ws/status/".to_string(),
            notification: "/ws/notifications/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ws_base_url: String,
    pub http_base_url: String,
    pub endpoints: EndpointConfig,
    pub reconnect: ReconnectPolicy,
    /// Quiet period after the last keystroke before `stop_typing` is sent
    pub typing_stop_after: Duration,
    /// How long a remote typist stays visible without a new `typing` event
    pub typing_expiry: Duration,
    pub token_refresh_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://127.0.0.1:8000".to_string(),
            http_base_url: "http://127.0.0.1:8000".to_string(),
            endpoints: EndpointConfig::default(),
            reconnect: ReconnectPolicy::default(),
            typing_stop_after: Duration::from_millis(1000),
            typing_expiry: Duration::from_millis(1000),
            token_refresh_interval: Duration::from_secs(25 * 60),
        }
    }
}
