//! HTTP API DTOs.
//!
//! The auth and user-list endpoints answer with a common envelope:
//! `{status, message, token?, data?}`.

use serde::{Deserialize, Serialize};

use super::websocket::{UserDto, WireId};

/// Response envelope shared by the HTTP API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<TokenPairDto>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPairDto {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub mobile: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub email: &'a str,
    pub mobile: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Token refresh answer; servers without rotation omit `refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListRequest {
    #[serde(rename = "userId")]
    pub user_id: WireId,
}

pub type UserListResponse = ApiEnvelope<Vec<UserDto>>;
pub type AuthResponse = ApiEnvelope<UserDto>;
