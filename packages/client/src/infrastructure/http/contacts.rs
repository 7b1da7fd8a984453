//! Contact directory over the HTTP API.

use async_trait::async_trait;

use super::ApiClient;
use crate::domain::{ContactDirectory, Identity, UserProfile};
use crate::error::GatewayError;
use crate::infrastructure::dto::http::{UserListRequest, UserListResponse};
use crate::infrastructure::dto::websocket::WireId;

const USER_LIST_PATH: &str = "/user-list/";

#[derive(Debug, Clone)]
pub struct HttpContactDirectory {
    api: ApiClient,
}

impl HttpContactDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(base_url),
        }
    }
}

#[async_trait]
impl ContactDirectory for HttpContactDirectory {
    async fn contacts(&self, identity: &Identity) -> Result<Vec<UserProfile>, GatewayError> {
        let body = UserListRequest {
            user_id: WireId::from_user_id(&identity.user.id),
        };
        let response: UserListResponse = self
            .api
            .post_json(USER_LIST_PATH, &body, Some(&identity.access_token))
            .await?;

        if !response.status {
            return Err(GatewayError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "Failed to fetch users".to_string()),
            ));
        }
        Ok(response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(UserProfile::from)
            .collect())
    }
}
