//! Credential and profile session.
//!
//! Holds the signed-in user and bearer credential and publishes them as
//! `Option<Identity>` over a `watch` channel. The synchronizer consumes that
//! receiver read-only; it never mutates the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{error, info};

use crate::domain::{AuthGateway, AuthGrant, Identity, ProfileUpdate, Registration, UserProfile};
use crate::error::SessionError;

pub struct Session {
    gateway: Arc<dyn AuthGateway>,
    identity: watch::Sender<Option<Identity>>,
    refresh_token: Mutex<Option<String>>,
}

impl Session {
    pub fn new(gateway: Arc<dyn AuthGateway>) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            gateway,
            identity,
            refresh_token: Mutex::new(None),
        }
    }

    /// Subscribe to identity changes
    pub fn identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    pub fn current(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    pub async fn login(&self, mobile: &str, password: &str) -> Result<Identity, SessionError> {
        let grant = self.gateway.login(mobile, password).await?;
        info!("Signed in as {}", grant.user.mobile);
        Ok(self.establish(grant).await)
    }

    /// Register a new account; a successful registration signs in.
    pub async fn register(&self, form: &Registration) -> Result<Identity, SessionError> {
        let grant = self.gateway.register(form).await?;
        info!("Registered {}", grant.user.mobile);
        Ok(self.establish(grant).await)
    }

    /// Clear the credential and profile
    pub async fn logout(&self) {
        *self.refresh_token.lock().await = None;
        self.identity.send_replace(None);
        info!("Signed out");
    }

    /// Merge profile fields locally; no server round-trip.
    pub fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, SessionError> {
        let mut updated = None;
        self.identity.send_if_modified(|identity| match identity {
            Some(identity) => {
                let user = &mut identity.user;
                if let Some(name) = update.name {
                    user.name = name;
                }
                if let Some(email) = update.email {
                    user.email = email;
                }
                if let Some(profile_pic) = update.profile_pic {
                    user.profile_pic = Some(profile_pic);
                }
                updated = Some(user.clone());
                true
            }
            None => false,
        });
        updated.ok_or(SessionError::NotSignedIn)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Any failure signs the user out.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let Some(refresh_token) = self.refresh_token.lock().await.clone() else {
            return Err(SessionError::NotSignedIn);
        };

        match self.gateway.refresh(&refresh_token).await {
            Ok(tokens) => {
                *self.refresh_token.lock().await = Some(tokens.refresh);
                self.identity.send_modify(|identity| {
                    if let Some(identity) = identity {
                        identity.access_token = tokens.access;
                    }
                });
                info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                error!("Token refresh failed, signing out: {}", e);
                self.logout().await;
                Err(e.into())
            }
        }
    }

    /// Refresh the access token every `interval` while signed in.
    pub fn spawn_refresh_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if session.current().is_none() {
                    continue;
                }
                // Failure already signed the user out
                let _ = session.refresh().await;
            }
        })
    }

    async fn establish(&self, grant: AuthGrant) -> Identity {
        let identity = Identity {
            user: grant.user,
            access_token: grant.tokens.access,
        };
        *self.refresh_token.lock().await = Some(grant.tokens.refresh);
        self.identity.send_replace(Some(identity.clone()));
        identity
    }
}
