//! 外部コラボレーターの trait 定義
//!
//! 認証・連絡先・ファイルアップロードのインターフェースをドメイン層で定義し、
//! 具体的な実装（HTTP クライアントなど）は Infrastructure 層が提供します（依存性の逆転）。

use std::path::Path;

use async_trait::async_trait;

use super::model::{Identity, UserProfile};
use crate::error::GatewayError;

/// アクセストークンとリフレッシュトークンの組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// ログイン・登録の成功結果
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub tokens: TokenPair,
    pub user: UserProfile,
}

/// 新規登録フォーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub password: String,
    pub email: String,
    pub mobile: String,
}

/// プロフィールの部分更新（ローカルでマージされる）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub profile_pic: Option<String>,
}

/// 認証サーバーへのインターフェース
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// 携帯番号とパスワードでログイン
    async fn login(&self, mobile: &str, password: &str) -> Result<AuthGrant, GatewayError>;

    /// 新規登録（成功時はそのままログイン状態になる）
    async fn register(&self, form: &Registration) -> Result<AuthGrant, GatewayError>;

    /// リフレッシュトークンから新しいトークンを取得
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, GatewayError>;
}

/// 連絡先（ユーザー一覧）の取得
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn contacts(&self, identity: &Identity) -> Result<Vec<UserProfile>, GatewayError>;
}

/// ファイルをアップロードして URL を返すブラックボックス
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, GatewayError>;
}

/// オンライン状態のユーザーだけを残す
///
/// オンライン状態は明示的に false の場合のみオフライン扱い。
pub fn online_contacts(contacts: &[UserProfile]) -> Vec<UserProfile> {
    contacts
        .iter()
        .filter(|user| user.is_online)
        .cloned()
        .collect()
}
