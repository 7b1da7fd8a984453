//! reqwest-backed HTTP gateways.

pub mod auth;
pub mod contacts;

pub use auth::HttpAuthGateway;
pub use contacts::HttpContactDirectory;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::GatewayError;

/// Thin JSON-over-HTTP client bound to one base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// POST a JSON body and decode the JSON answer.
    ///
    /// Non-success statuses are still decoded when the body is JSON, so the
    /// server's `message` reaches the caller; otherwise the status is reported.
    pub async fn post_json<TReq, TRes>(
        &self,
        path: &str,
        body: &TReq,
        bearer: Option<&str>,
    ) -> Result<TRes, GatewayError>
    where
        TReq: Serialize + ?Sized + Sync,
        TRes: DeserializeOwned,
    {
        let url = self.url(path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        tracing::debug!("POST {}", url);
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<TRes>(&bytes) {
            Ok(decoded) => Ok(decoded),
            Err(_) if !status.is_success() => Err(GatewayError::Status(status.as_u16())),
            Err(e) => Err(GatewayError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        // テスト項目: ベース URL とパスがスラッシュの重複なしで結合される
        // given (前提条件):
        let client = ApiClient::new("http://127.0.0.1:8000/");

        // when (操作):
        let url = client.url("/login/");

        // then (期待する結果):
        assert_eq!(url, "http://127.0.0.1:8000/login/");
    }
}
