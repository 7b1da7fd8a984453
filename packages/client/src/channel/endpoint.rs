//! Endpoint URL construction.

use url::Url;

use crate::config::EndpointConfig;
use crate::domain::ChannelKind;
use crate::error::ChannelError;

const CHAT_ID_PLACEHOLDER: &str = "{chat_id}";

/// Build the socket URL for a channel.
///
/// The credential travels as the `token` query parameter; the conversation
/// channel additionally embeds the conversation id in its path.
pub fn channel_url(
    ws_base_url: &str,
    endpoints: &EndpointConfig,
    kind: ChannelKind,
    chat_id: Option<&str>,
    token: &str,
) -> Result<String, ChannelError> {
    if token.is_empty() {
        return Err(ChannelError::MissingCredential(kind));
    }

    let template = match kind {
        ChannelKind::Conversation => {
            let chat_id = chat_id
                .filter(|id| !id.is_empty())
                .ok_or(ChannelError::MissingConversation(kind))?;
            endpoints.conversation.replace(CHAT_ID_PLACEHOLDER, chat_id)
        }
        ChannelKind::DeliveryStatus => endpoints.delivery_status.clone(),
        ChannelKind::Notification => endpoints.notification.clone(),
    };

    let mut url = Url::parse(ws_base_url)?;
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}{template}"));
    url.query_pairs_mut().clear().append_pair("token", token);

    Ok(url.to_string())
}
