//! The credential lifecycle: device-code authorization, periodic validation, and refresh.
//!
//! [`Auth`] owns the [`Credential`] and publishes its validity on a watch channel. The
//! application listens on that channel and starts (or tears down) chat and polling when the
//! credential becomes valid (or stops being so).
//!
//! Transport failures never change state; the next validation tick retries. A rejected
//! refresh token is the one terminal failure: tokens are wiped and validation stops until
//! someone authorizes a new device code.

use crate::config::Settings;
use crate::oauth::{DevicePoll, OAuthManager, TokenValidation};
use jiff::Timestamp;
use oauth2::{AccessToken, RefreshToken};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

pub mod tokens;

use tokens::TokenStore;

/// Tokens with less than this many seconds left are refreshed before they are used.
const MIN_TOKEN_LIFETIME_SECS: u64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    NoCredential,
    AwaitingDeviceAuthorization,
    Polling,
    Valid,
    Refreshing,
    /// A refresh token was rejected. Only a new device-code grant gets out of here.
    Invalid,
}

/// What the identity host last told us about the current access token.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Credential {
    pub client_id: String,
    pub login: String,
    pub user_id: String,
    pub scopes: BTreeSet<String>,
    pub valid: bool,
}

/// A device code waiting for the user to approve it.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub verification_uri: String,
    pub issued_at: Timestamp,
    pub expires_in: u64,
}

#[derive(Debug)]
struct AuthInner {
    state: AuthState,
    credential: Credential,
    device_code: Option<DeviceCodeInfo>,
    validation_task: Option<JoinHandle<()>>,
    device_task: Option<JoinHandle<()>>,
}

/// Outcome of a single call to the validation endpoint.
enum Checked {
    Valid(TokenValidation),
    Expiring(TokenValidation),
    Rejected,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Auth {
    inner: Arc<Mutex<AuthInner>>,
    oauth: OAuthManager,
    tokens: TokenStore,
    validation_interval: Duration,
    valid_tx: Arc<watch::Sender<bool>>,
}

impl Auth {
    pub fn new(settings: &Settings, tokens: TokenStore) -> eyre::Result<Self> {
        let oauth = OAuthManager::new(&settings.client_id, &settings.identity_url)?;
        let (valid_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Mutex::new(AuthInner {
                state: AuthState::NoCredential,
                credential: Credential {
                    client_id: settings.client_id.clone(),
                    ..Credential::default()
                },
                device_code: None,
                validation_task: None,
                device_task: None,
            })),
            oauth,
            tokens,
            validation_interval: settings.validation_interval,
            valid_tx: Arc::new(valid_tx),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Starts periodic validation if a token pair is stored.
    pub async fn init(&self) {
        if self.tokens.is_complete().await {
            self.start_validation_timer().await;
        } else {
            tracing::info!("no stored tokens, waiting for device authorization");
            self.inner.lock().await.state = AuthState::NoCredential;
        }
    }

    /// (Re)starts the validation timer. The first validation happens immediately.
    pub async fn start_validation_timer(&self) {
        let auth = self.clone();
        let every = self.validation_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                auth.validate_tokens().await;
            }
        });

        if let Some(old) = self.inner.lock().await.validation_task.replace(task) {
            old.abort();
        }
    }

    /// Checks the access token with the identity host, refreshing it when it is rejected or
    /// about to expire.
    ///
    /// At most one refresh happens per call.
    pub async fn validate_tokens(&self) {
        match self.check().await {
            Checked::Valid(validation) => self.mark_valid(validation).await,
            Checked::Expiring(validation) => {
                tracing::info!(
                    expires_in = validation.expires_in,
                    "access token expires soon, refreshing"
                );
                self.refresh_tokens().await;
            }
            Checked::Rejected => self.refresh_tokens().await,
            Checked::Unavailable => {}
        }
    }

    /// Exchanges the refresh token for a new pair, persists it, and validates the new access
    /// token.
    ///
    /// A rejected refresh token moves to [`AuthState::Invalid`].
    pub async fn refresh_tokens(&self) {
        let Some(refresh_token) = self.tokens.refresh_token().await else {
            tracing::warn!("no refresh token stored, credential cannot be renewed");
            self.invalidate().await;
            return;
        };

        let previous = {
            let mut inner = self.inner.lock().await;
            std::mem::replace(&mut inner.state, AuthState::Refreshing)
        };

        match self.oauth.refresh(&RefreshToken::new(refresh_token)).await {
            Ok(Ok(grant)) => {
                tracing::info!("refreshed access token");
                self.tokens
                    .replace(grant.access_token.secret(), grant.refresh_token.secret())
                    .await;
                match self.check().await {
                    Checked::Valid(validation) | Checked::Expiring(validation) => {
                        self.mark_valid(validation).await
                    }
                    Checked::Rejected => {
                        tracing::warn!("freshly refreshed access token failed validation");
                        self.inner.lock().await.state = previous;
                    }
                    Checked::Unavailable => self.inner.lock().await.state = previous,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, body = %e.body, "refresh token rejected");
                self.invalidate().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to refresh access token");
                self.inner.lock().await.state = previous;
            }
        }
    }

    async fn check(&self) -> Checked {
        let Some(access_token) = self.tokens.access_token().await else {
            return Checked::Rejected;
        };
        match self.oauth.validate(&AccessToken::new(access_token)).await {
            Ok(Ok(validation)) if validation.expires_in < MIN_TOKEN_LIFETIME_SECS => {
                Checked::Expiring(validation)
            }
            Ok(Ok(validation)) => Checked::Valid(validation),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "access token failed validation");
                Checked::Rejected
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to reach token validation endpoint");
                Checked::Unavailable
            }
        }
    }

    async fn mark_valid(&self, validation: TokenValidation) {
        {
            let mut inner = self.inner.lock().await;
            inner.state = AuthState::Valid;
            inner.credential = Credential {
                client_id: validation.client_id,
                login: validation.login,
                user_id: validation.user_id,
                scopes: validation.scopes.unwrap_or_default().into_iter().collect(),
                valid: true,
            };
            tracing::debug!(
                login = %inner.credential.login,
                scopes = inner.credential.scopes.len(),
                "validated access token"
            );
        }

        self.valid_tx.send_if_modified(|valid| {
            let became_valid = !*valid;
            *valid = true;
            if became_valid {
                tracing::info!("credential is now valid");
            }
            became_valid
        });
    }

    /// The terminal failure: forget everything and stop validating.
    ///
    /// This runs on the validation task itself, so the timer is aborted only after everything
    /// else is done.
    async fn invalidate(&self) {
        let timer = {
            let mut inner = self.inner.lock().await;
            inner.state = AuthState::Invalid;
            inner.credential = Credential {
                client_id: inner.credential.client_id.clone(),
                ..Credential::default()
            };
            inner.validation_task.take()
        };
        self.tokens.clear().await;
        if self.valid_tx.send_replace(false) {
            tracing::warn!("credential invalidated, re-authorization required");
        }
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    /// Requests a device code for `scopes` and polls for the grant in the background.
    ///
    /// Returns what the user needs to approve the request, or `None` if no code could be
    /// obtained (the failure is logged).
    pub async fn generate_device_code(&self, scopes: &[&str]) -> Option<DeviceCodeInfo> {
        let device = match self.oauth.request_device_code(scopes).await {
            Ok(Ok(device)) => device,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, body = %e.body, "device code request rejected");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to request device code");
                return None;
            }
        };

        let info = DeviceCodeInfo {
            user_code: device.user_code.secret().clone(),
            verification_uri: device.verification_uri.clone(),
            issued_at: Timestamp::now(),
            expires_in: device.expires_in,
        };
        tracing::info!(
            user_code = %info.user_code,
            uri = %info.verification_uri,
            "waiting for device authorization"
        );

        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        let auth = self.clone();
        let task = tokio::spawn(async move {
            let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
            auth.poll_device_code(device, &scopes).await;
        });

        let mut inner = self.inner.lock().await;
        inner.state = AuthState::AwaitingDeviceAuthorization;
        inner.device_code = Some(info.clone());
        if let Some(old) = inner.device_task.replace(task) {
            old.abort();
        }
        Some(info)
    }

    async fn poll_device_code(&self, device: crate::oauth::DeviceAuthorization, scopes: &[&str]) {
        let mut interval = tokio::time::interval(device.poll_interval());
        // the first tick is immediate and the user cannot have approved yet
        interval.tick().await;
        loop {
            interval.tick().await;
            self.inner.lock().await.state = AuthState::Polling;
            match self.oauth.poll_device_code(&device.device_code, scopes).await {
                Ok(DevicePoll::Issued(grant)) => {
                    tracing::info!("device authorization granted");
                    self.tokens
                        .replace(grant.access_token.secret(), grant.refresh_token.secret())
                        .await;
                    self.inner.lock().await.device_code = None;
                    self.start_validation_timer().await;
                    return;
                }
                Ok(DevicePoll::Pending) => {
                    tracing::trace!("device authorization still pending");
                }
                Ok(DevicePoll::Rejected(e)) => {
                    tracing::warn!(error = %e, "device code rejected, a new one is needed");
                    let mut inner = self.inner.lock().await;
                    inner.device_code = None;
                    inner.state = if inner.credential.valid {
                        AuthState::Valid
                    } else {
                        AuthState::NoCredential
                    };
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to poll device authorization");
                }
            }
        }
    }

    pub async fn credential(&self) -> Credential {
        self.inner.lock().await.credential.clone()
    }

    pub async fn is_valid(&self) -> bool {
        self.inner.lock().await.credential.valid
    }

    pub async fn has_scope(&self, scope: &str) -> bool {
        self.inner.lock().await.credential.scopes.contains(scope)
    }

    pub async fn user_id(&self) -> String {
        self.inner.lock().await.credential.user_id.clone()
    }

    pub async fn login(&self) -> String {
        self.inner.lock().await.credential.login.clone()
    }

    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state
    }

    pub async fn device_code_info(&self) -> Option<DeviceCodeInfo> {
        self.inner.lock().await.device_code.clone()
    }

    /// Receives `true` whenever the credential becomes valid and `false` when it stops being so.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.valid_tx.subscribe()
    }

    /// Stops validation and any pending device authorization.
    pub async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        for task in [inner.validation_task.take(), inner.device_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
