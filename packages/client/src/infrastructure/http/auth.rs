//! Auth gateway over the HTTP API.

use async_trait::async_trait;

use super::ApiClient;
use crate::domain::{AuthGateway, AuthGrant, Registration, TokenPair};
use crate::error::GatewayError;
use crate::infrastructure::dto::http::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
};

const LOGIN_PATH: &str = "/login/";
const REGISTER_PATH: &str = "/register/";
const REFRESH_PATH: &str = "/token/refresh/";

#[derive(Debug, Clone)]
pub struct HttpAuthGateway {
    api: ApiClient,
}

impl HttpAuthGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(base_url),
        }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, mobile: &str, password: &str) -> Result<AuthGrant, GatewayError> {
        let body = LoginRequest { mobile, password };
        let response: AuthResponse = self.api.post_json(LOGIN_PATH, &body, None).await?;
        response.into_grant().map_err(GatewayError::Rejected)
    }

    async fn register(&self, form: &Registration) -> Result<AuthGrant, GatewayError> {
        let body = RegisterRequest {
            name: &form.name,
            password: &form.password,
            email: &form.email,
            mobile: &form.mobile,
        };
        let response: AuthResponse = self.api.post_json(REGISTER_PATH, &body, None).await?;
        response.into_grant().map_err(GatewayError::Rejected)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, GatewayError> {
        let body = RefreshRequest {
            refresh: refresh_token,
        };
        let response: RefreshResponse = self.api.post_json(REFRESH_PATH, &body, None).await?;
        Ok(TokenPair {
            access: response.access,
            refresh: response
                .refresh
                .unwrap_or_else(|| refresh_token.to_string()),
        })
    }
}
