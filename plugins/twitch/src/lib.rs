//! Twitch integration for control-surface hosts.
//!
//! The adapter keeps a local mirror of a set of channels fresh by polling Helix and listening
//! to chat, and exposes operations that act on those channels. [`Context`] wires the parts
//! together; hosts drive it through [`Context::start`], [`Context::update_config`] and the
//! handles it exposes.

use crate::admin::AdminServer;
use crate::auth::Auth;
use crate::auth::tokens::TokenStore;
use crate::background::poller::{FixedInterval, PollScheduler};
use crate::background::ticker::Ticker;
use crate::channels::ChannelRegistry;
use crate::chat::ChatSession;
use crate::config::{Config, SaveTokens, Settings};
use crate::operations::Operations;
use crate::twitch_api::HelixClient;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub mod activity;
pub mod admin;
pub mod auth;
pub mod background;
pub mod channels;
pub mod chat;
pub mod config;
pub mod oauth;
pub mod operations;
pub mod twitch_api;

/// Everything a running adapter is made of.
///
/// Components hold clones of the handles they need; nothing here is global.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub auth: Auth,
    pub api: HelixClient,
    pub channels: ChannelRegistry,
    pub ops: Operations,
    pub chat: ChatSession,
    pub poller: PollScheduler,
    config: Arc<Mutex<Config>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Context {
    pub async fn new(settings: Settings, config: Config, save: SaveTokens) -> eyre::Result<Self> {
        let tokens = TokenStore::new(&config.access_token, &config.refresh_token, save);
        let auth = Auth::new(&settings, tokens.clone())?;
        let api = HelixClient::new(&settings.helix_url, &settings.client_id, tokens)?;
        let channels = ChannelRegistry::new();
        channels.rebuild(&config.channels).await;
        let ops = Operations::new(auth.clone(), api.clone(), channels.clone());
        let chat = ChatSession::new(&settings, auth.clone(), channels.clone());
        let poller = PollScheduler::new(ops.clone());

        Ok(Self {
            settings,
            auth,
            api,
            channels,
            ops,
            chat,
            poller,
            config: Arc::new(Mutex::new(config)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub async fn config(&self) -> Config {
        self.config.lock().await.clone()
    }

    /// Starts the timers and begins validating the stored tokens.
    ///
    /// Chat and the initial poll start whenever the credential becomes valid, and chat is torn
    /// down whenever it stops being so.
    pub async fn start(&self) -> eyre::Result<()> {
        let mut tasks = vec![
            Ticker::new(self.ops.clone()).spawn(),
            self.poller
                .spawn(FixedInterval(self.settings.poll_interval)),
            self.spawn_lifecycle(),
        ];

        let config = self.config().await;
        if let Some(port) = config.admin_port {
            let admin = AdminServer::new(
                self.auth.clone(),
                self.channels.clone(),
                config.requested_scopes(),
            );
            let (_, task) = admin.spawn(port).await?;
            tasks.push(task);
        }
        self.tasks.lock().await.extend(tasks);

        self.auth.init().await;
        Ok(())
    }

    fn spawn_lifecycle(&self) -> JoinHandle<()> {
        let mut valid = self.auth.subscribe();
        let ctx = self.clone();
        tokio::spawn(async move {
            while valid.changed().await.is_ok() {
                let is_valid = *valid.borrow_and_update();
                if is_valid {
                    let login = ctx.auth.login().await;
                    tracing::info!(%login, "credential is valid, starting up");
                    ctx.chat.update().await;
                    ctx.poller.poll_data().await;
                    ctx.poller.initial_poll().await;
                } else {
                    tracing::info!("credential is no longer valid, stopping chat");
                    ctx.chat.destroy().await;
                }
            }
        })
    }

    /// Applies an edited config: new tokens are validated, the registry is rebuilt from the
    /// channel list, and chat rooms are reconciled against it.
    pub async fn update_config(&self, config: Config) {
        let previous = std::mem::replace(&mut *self.config.lock().await, config.clone());

        if previous.access_token != config.access_token
            || previous.refresh_token != config.refresh_token
        {
            tracing::info!("tokens changed, validating");
            self.auth
                .tokens()
                .replace(&config.access_token, &config.refresh_token)
                .await;
            self.auth.init().await;
        }

        self.channels.rebuild(&config.channels).await;
        self.chat.update().await;
        self.poller.poll_data().await;
    }

    /// Stops every timer and the chat connection. In-flight requests are left to finish.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.chat.destroy().await;
        self.auth.destroy().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn config_change_rebuilds_registry() {
        let server = MockServer::start().await;
        let settings = Settings {
            helix_url: server.uri(),
            identity_url: server.uri(),
            ..Settings::default()
        };
        let config = Config {
            channels: "one two".into(),
            ..Config::default()
        };
        let ctx = Context::new(settings, config.clone(), Arc::new(|_, _| Ok(())))
            .await
            .unwrap();
        assert_eq!(ctx.channels.usernames().await, vec!["one", "two"]);

        ctx.update_config(Config {
            channels: "three".into(),
            ..config
        })
        .await;
        assert_eq!(ctx.channels.usernames().await, vec!["three"]);
        assert_eq!(ctx.config().await.channels, "three");
    }

    #[tokio::test]
    async fn valid_credential_triggers_first_poll() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "cid",
                "login": "me",
                "scopes": [],
                "user_id": "1",
                "expires_in": 14_000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": "1", "login": "me", "display_name": "Me" }]
            })))
            .expect(1..)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&server)
            .await;

        let settings = Settings {
            helix_url: server.uri(),
            identity_url: server.uri(),
            // keep chat away from the network
            irc_addr: "127.0.0.1:1".into(),
            ..Settings::default()
        };
        let config = Config {
            access_token: "token".into(),
            refresh_token: "refresh".into(),
            channels: "me".into(),
            ..Config::default()
        };
        let ctx = Context::new(settings, config, Arc::new(|_, _| Ok(())))
            .await
            .unwrap();
        let mut valid = ctx.auth.subscribe();
        ctx.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), valid.wait_for(|v| *v))
            .await
            .unwrap()
            .unwrap();
        let me = async {
            loop {
                if let Some(me) = ctx.channels.find_by_id("1").await {
                    return me;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        let me = tokio::time::timeout(Duration::from_secs(5), me).await.unwrap();
        assert_eq!(me.display_name, "Me");
        ctx.shutdown().await;
    }
}
