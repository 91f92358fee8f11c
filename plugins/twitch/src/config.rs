//! User configuration and runtime tunables.
//!
//! [`Config`] is what the user edits: stored tokens, the channel list, and the permission
//! toggles that decide which OAuth scopes are requested. [`Settings`] holds the endpoints and
//! timer cadences, which only tests and unusual deployments ever change.

use eyre::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Public client id of the Companion application registered with Twitch.
pub const CLIENT_ID: &str = "0v78s08sgp7j9am52mpmqcztoz5mvw";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub access_token: String,
    pub refresh_token: String,
    /// Space or comma separated `username` / `username:DisplayName` tokens.
    pub channels: String,
    pub admin_port: Option<u16>,

    pub broadcaster_ads: bool,
    pub broadcaster_bits: bool,
    pub broadcaster_channel_points: bool,
    pub broadcaster_charity: bool,
    pub broadcaster_goals: bool,
    pub broadcaster_extensions: bool,
    pub broadcaster_hype_train: bool,
    pub broadcaster_moderation: bool,
    pub broadcaster_polls_predictions: bool,
    pub broadcaster_raids: bool,
    pub broadcaster_stream_key: bool,
    pub broadcaster_guest_star: bool,
    pub broadcaster_subscriptions: bool,
    #[serde(rename = "broadcasterVIPs")]
    pub broadcaster_vips: bool,
    pub editor_stream_markers: bool,
    pub editor_create_clips: bool,
    pub moderator_announcements: bool,
    pub moderator_automod: bool,
    pub moderator_chat_moderation: bool,
    pub moderator_chatters: bool,
    pub moderator_followers: bool,
    pub moderator_shield_mode: bool,
    pub moderator_shoutouts: bool,
    pub moderator_guest_star: bool,
    pub moderator_unban_requests: bool,
    pub moderator_warnings: bool,
    pub user_chat: bool,
    pub user_clips: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: String::new(),
            channels: String::new(),
            admin_port: None,
            broadcaster_ads: true,
            broadcaster_bits: true,
            broadcaster_channel_points: true,
            broadcaster_charity: true,
            broadcaster_goals: true,
            broadcaster_extensions: true,
            broadcaster_hype_train: true,
            broadcaster_moderation: true,
            broadcaster_polls_predictions: true,
            broadcaster_raids: true,
            broadcaster_stream_key: true,
            broadcaster_guest_star: true,
            broadcaster_subscriptions: true,
            broadcaster_vips: true,
            editor_stream_markers: true,
            editor_create_clips: true,
            moderator_announcements: true,
            moderator_automod: true,
            moderator_chat_moderation: true,
            moderator_chatters: true,
            moderator_followers: true,
            moderator_shield_mode: true,
            moderator_shoutouts: true,
            moderator_guest_star: true,
            moderator_unban_requests: true,
            moderator_warnings: true,
            user_chat: true,
            user_clips: true,
        }
    }
}

impl Config {
    /// Parses a JSON configuration document.
    ///
    /// Missing fields take their defaults, so an empty object is a valid config.
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).context("parse configuration JSON")
    }

    /// Lists the OAuth scopes to request given the enabled permission toggles.
    ///
    /// Order follows the toggle list and no scope appears twice.
    pub fn requested_scopes(&self) -> Vec<&'static str> {
        let mut scopes: Vec<&'static str> = Vec::new();
        let mut add = |enabled: bool, names: &[&'static str]| {
            if enabled {
                for name in names {
                    if !scopes.contains(name) {
                        scopes.push(name);
                    }
                }
            }
        };

        add(
            self.broadcaster_ads,
            &[
                "channel:read:ads",
                "channel:manage:ads",
                "channel:edit:commercial",
            ],
        );
        add(self.broadcaster_bits, &["bits:read"]);
        add(
            self.broadcaster_channel_points,
            &["channel:manage:redemptions"],
        );
        add(self.broadcaster_charity, &["channel:read:charity"]);
        add(self.broadcaster_goals, &["channel:read:goals"]);
        add(self.broadcaster_extensions, &["channel:manage:extensions"]);
        add(self.broadcaster_hype_train, &["channel:read:hype_train"]);
        add(
            self.broadcaster_moderation,
            &["channel:moderate", "moderation:read"],
        );
        add(
            self.broadcaster_polls_predictions,
            &["channel:manage:polls", "channel:manage:predictions"],
        );
        add(self.broadcaster_raids, &["channel:manage:raids"]);
        add(self.broadcaster_stream_key, &["channel:read:stream_key"]);
        add(
            self.broadcaster_guest_star,
            &["channel:read:guest_star", "channel:manage:guest_star"],
        );
        add(
            self.broadcaster_subscriptions,
            &["channel:read:subscriptions"],
        );
        add(self.broadcaster_vips, &["channel:manage:vips"]);
        add(self.editor_stream_markers, &["channel:manage:broadcast"]);
        add(self.editor_create_clips, &["channel:manage:clips"]);

        let any_moderator = self.moderator_announcements
            || self.moderator_automod
            || self.moderator_chat_moderation
            || self.moderator_chatters
            || self.moderator_followers
            || self.moderator_shield_mode
            || self.moderator_shoutouts
            || self.moderator_guest_star
            || self.moderator_unban_requests
            || self.moderator_warnings;
        add(any_moderator, &["user:read:moderated_channels"]);

        add(
            self.moderator_announcements,
            &["moderator:manage:announcements"],
        );
        add(
            self.moderator_automod,
            &[
                "moderator:manage:automod",
                "moderator:read:automod_settings",
                "moderator:manage:automod_settings",
            ],
        );
        add(
            self.moderator_chat_moderation,
            &[
                "moderator:manage:banned_users",
                "moderator:manage:blocked_terms",
                "moderator:manage:chat_messages",
                "moderator:manage:chat_settings",
                "moderator:read:suspicious_users",
            ],
        );
        add(self.moderator_chatters, &["moderator:read:chatters"]);
        add(self.moderator_followers, &["moderator:read:followers"]);
        add(
            self.moderator_shield_mode,
            &["moderator:read:shield_mode", "moderator:manage:shield_mode"],
        );
        add(self.moderator_shoutouts, &["moderator:manage:shoutouts"]);
        add(
            self.moderator_guest_star,
            &["moderator:read:guest_star", "moderator:manage:guest_star"],
        );
        add(
            self.moderator_unban_requests,
            &[
                "moderator:read:unban_requests",
                "moderator:manage:unban_requests",
            ],
        );
        add(
            self.moderator_warnings,
            &["moderator:read:warnings", "moderator:manage:warnings"],
        );
        add(
            self.user_chat,
            &[
                "user:read:chat",
                "chat:read",
                "user:write:chat",
                "chat:edit",
                "user:manage:chat_color",
            ],
        );
        add(self.user_clips, &["clips:edit"]);

        scopes
    }
}

/// Endpoints and timer cadences.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    /// Base URL of the Helix REST API, without a trailing slash.
    pub helix_url: String,
    /// Base URL of the OAuth2 identity host, without a trailing slash.
    pub identity_url: String,
    /// `host:port` of the TLS IRC endpoint.
    pub irc_addr: String,
    pub validation_interval: Duration,
    pub poll_interval: Duration,
    /// Minimum gap between chat JOIN/PART commands.
    pub membership_interval: Duration,
    /// How long after connecting the chat session ignores reconciliation requests.
    pub chat_settle: Duration,
    pub chat_reconnect_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            helix_url: "https://api.twitch.tv/helix".to_string(),
            identity_url: "https://id.twitch.tv/oauth2".to_string(),
            irc_addr: "irc.chat.twitch.tv:6697".to_string(),
            validation_interval: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(20),
            membership_interval: Duration::from_millis(2500),
            chat_settle: Duration::from_secs(30),
            chat_reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Where refreshed tokens go once the identity host has issued them.
///
/// Hosts embedding the adapter supply their own callback; the CLI writes the config file.
pub type SaveTokens = Arc<dyn Fn(&str, &str) -> eyre::Result<()> + Send + Sync>;

/// A JSON config file on disk that token updates are written back into.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the config, treating a missing file as the default config.
    pub async fn load(&self) -> eyre::Result<Config> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("check for {}", self.path.display()))?
        {
            tracing::info!(path = %self.path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read {}", self.path.display()))?;
        Config::from_json(&json)
    }

    /// Rewrites only the token fields, keeping whatever else the file holds.
    pub fn save_tokens(&self, access_token: &str, refresh_token: &str) -> eyre::Result<()> {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(json) => Config::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        config.access_token = access_token.to_string();
        config.refresh_token = refresh_token.to_string();
        let json = serde_json::to_string_pretty(&config).context("serialize configuration")?;
        std::fs::write(&self.path, json).with_context(|| format!("write {}", self.path.display()))
    }

    pub fn saver(&self) -> SaveTokens {
        let file = self.clone();
        Arc::new(move |access, refresh| file.save_tokens(access, refresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_enables_everything() {
        let config = Config::from_json("{}").unwrap();
        assert!(config.broadcaster_vips);
        assert!(config.user_clips);
        assert_eq!(config.channels, "");
    }

    #[test]
    fn camel_case_fields() {
        let config = Config::from_json(
            r#"{"accessToken":"a","refreshToken":"r","channels":"foo","broadcasterVIPs":false}"#,
        )
        .unwrap();
        assert_eq!(config.access_token, "a");
        assert_eq!(config.refresh_token, "r");
        assert!(!config.broadcaster_vips);
    }

    #[test]
    fn scopes_follow_toggles() {
        let config = Config {
            broadcaster_ads: false,
            broadcaster_bits: false,
            broadcaster_channel_points: false,
            broadcaster_charity: false,
            broadcaster_goals: false,
            broadcaster_extensions: false,
            broadcaster_hype_train: false,
            broadcaster_moderation: false,
            broadcaster_polls_predictions: true,
            broadcaster_raids: false,
            broadcaster_stream_key: false,
            broadcaster_guest_star: false,
            broadcaster_subscriptions: false,
            broadcaster_vips: false,
            editor_stream_markers: false,
            editor_create_clips: false,
            moderator_announcements: false,
            moderator_automod: false,
            moderator_chat_moderation: false,
            moderator_chatters: true,
            moderator_followers: false,
            moderator_shield_mode: false,
            moderator_shoutouts: false,
            moderator_guest_star: false,
            moderator_unban_requests: false,
            moderator_warnings: false,
            user_chat: false,
            user_clips: true,
            ..Config::default()
        };
        assert_eq!(
            config.requested_scopes(),
            vec![
                "channel:manage:polls",
                "channel:manage:predictions",
                "user:read:moderated_channels",
                "moderator:read:chatters",
                "clips:edit",
            ]
        );
    }

    #[test]
    fn scopes_are_unique() {
        let scopes = Config::default().requested_scopes();
        let mut deduped = scopes.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(scopes.len(), deduped.len());
    }
}
