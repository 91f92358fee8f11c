//! Exchanges with the Twitch identity host.
//!
//! This module only speaks the wire protocol of the four bootstrap endpoints (device code,
//! device token, refresh, validate) and decodes each answer into an explicit success or error
//! type. What to do with the answers is decided by [`crate::auth::Auth`].

use crate::twitch_api::ApiResponse;
use crate::twitch_api::types::{Helix, string_or_number};
use eyre::Context;
use http::Method;
use oauth2::{AccessToken, DeviceCode, RefreshToken, UserCode};
use serde::Deserialize;
use std::time::Duration;

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Answer to a device authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: DeviceCode,
    pub user_code: UserCode,
    pub verification_uri: String,
    /// Seconds until the device code stops working.
    pub expires_in: u64,
    /// Seconds to wait between polls.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

impl DeviceAuthorization {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}

/// Tokens issued by a device-code or refresh-token grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// What the validation endpoint knows about an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenValidation {
    pub client_id: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: String,
    /// Seconds of life left in the token.
    pub expires_in: u64,
}

/// One poll of the device-code token exchange.
#[derive(Debug)]
pub enum DevicePoll {
    Issued(TokenGrant),
    /// The user has not finished authorizing yet.
    Pending,
    /// The device code expired or is otherwise unusable; a new one is needed.
    Rejected(crate::twitch_api::ApiError),
}

#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: String,
    identity_url: String,
    client: reqwest::Client,
}

impl OAuthManager {
    /// # Arguments
    ///
    /// * `client_id` - The public client id of the application
    /// * `identity_url` - Base URL of the identity host, e.g. `https://id.twitch.tv/oauth2`
    pub fn new(client_id: &str, identity_url: &str) -> eyre::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client_id: client_id.to_string(),
            identity_url: identity_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<String>,
        authorization: Option<String>,
    ) -> eyre::Result<ApiResponse> {
        let url = format!("{}/{}", self.identity_url, endpoint);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(authorization) = authorization {
            request = request.header("Authorization", authorization);
        }
        if let Some(form) = form {
            request = request
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(form);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to identity host: {}", method, url))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read identity response body: {}", url))?;
        Ok(ApiResponse { status, body })
    }

    fn form<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("client_id", &self.client_id);
        for (key, value) in pairs {
            form.append_pair(key, value);
        }
        form.finish()
    }

    /// Starts a device authorization for the given scopes.
    ///
    /// The returned user code and verification URI are shown to the user, who completes the
    /// grant in a browser on any device.
    pub async fn request_device_code(
        &self,
        scopes: &[&str],
    ) -> eyre::Result<Helix<DeviceAuthorization>> {
        let scopes = scopes.join(" ");
        let form = self.form([("scopes", scopes.as_str())]);
        let response = self
            .send(Method::POST, "device", Some(form), None)
            .await
            .context("request device code")?;
        Ok(response.decode())
    }

    /// Tries to exchange a device code for tokens.
    pub async fn poll_device_code(
        &self,
        device_code: &DeviceCode,
        scopes: &[&str],
    ) -> eyre::Result<DevicePoll> {
        let scopes = scopes.join(" ");
        let form = self.form([
            ("scopes", scopes.as_str()),
            ("device_code", device_code.secret().as_str()),
            ("grant_type", DEVICE_GRANT_TYPE),
        ]);
        let response = self
            .send(Method::POST, "token", Some(form), None)
            .await
            .context("exchange device code")?;
        Ok(match response.decode::<TokenGrant>() {
            Ok(grant) => DevicePoll::Issued(grant),
            Err(e) if e.message == "authorization_pending" => DevicePoll::Pending,
            Err(e) => DevicePoll::Rejected(e),
        })
    }

    /// Exchanges a refresh token for a new token pair. Refresh tokens are single use.
    pub async fn refresh(&self, refresh_token: &RefreshToken) -> eyre::Result<Helix<TokenGrant>> {
        let form = self.form([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.secret().as_str()),
        ]);
        let response = self
            .send(Method::POST, "token", Some(form), None)
            .await
            .context("exchange refresh token")?;
        Ok(response.decode())
    }

    pub async fn validate(
        &self,
        access_token: &AccessToken,
    ) -> eyre::Result<Helix<TokenValidation>> {
        let response = self
            .send(
                Method::GET,
                "validate",
                None,
                Some(format!("OAuth {}", access_token.secret())),
            )
            .await
            .context("validate access token")?;
        Ok(response.decode())
    }
}
