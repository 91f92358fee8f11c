//! The chat session: one IRC connection shared by every configured channel.
//!
//! The session joins and parts rooms to match the channel registry, and folds room-state,
//! mode notices and message counts into the matching [`Channel`](crate::channels::Channel).

use crate::auth::Auth;
use crate::channels::ChannelRegistry;
use crate::config::Settings;
use connection::ChatConnection;
use irc::{ChatEvent, ChatMode, RoomStateDelta, mode_command};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

pub mod connection;
pub mod irc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Membership {
    Join(String),
    Part(String),
}

#[derive(Debug)]
struct SessionInner {
    status: ChatStatus,
    connection: Option<ChatConnection>,
    /// Rooms the server has confirmed we are in.
    joined: BTreeSet<String>,
    pending: VecDeque<Membership>,
    /// Set while a connection has not yet passed the settle window after logging in.
    settling: bool,
    drain_task: Option<JoinHandle<()>>,
    settle_task: Option<JoinHandle<()>>,
    dispatch_task: Option<JoinHandle<()>>,
}

impl SessionInner {
    fn abort_tasks(&mut self) {
        for task in [
            self.drain_task.take(),
            self.settle_task.take(),
            self.dispatch_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    inner: Arc<Mutex<SessionInner>>,
    auth: Auth,
    channels: ChannelRegistry,
    irc_addr: String,
    membership_interval: Duration,
    settle: Duration,
    reconnect_delay: Duration,
}

impl ChatSession {
    pub fn new(settings: &Settings, auth: Auth, channels: ChannelRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                status: ChatStatus::Disconnected,
                connection: None,
                joined: BTreeSet::new(),
                pending: VecDeque::new(),
                settling: false,
                drain_task: None,
                settle_task: None,
                dispatch_task: None,
            })),
            auth,
            channels,
            irc_addr: settings.irc_addr.clone(),
            membership_interval: settings.membership_interval,
            settle: settings.chat_settle,
            reconnect_delay: settings.chat_reconnect_delay,
        }
    }

    /// Opens a fresh connection, replacing any existing one. Needs a valid credential.
    pub async fn init(&self) {
        if !self.auth.is_valid().await {
            tracing::debug!("not connecting to chat, credential is not valid");
            return;
        }
        let (events, rx_events) = mpsc::unbounded_channel();
        let connection = ChatConnection::connect(
            &self.irc_addr,
            &self.auth.login().await,
            self.auth.tokens().clone(),
            self.reconnect_delay,
            events,
        );
        self.attach(connection, rx_events).await;
    }

    async fn attach(
        &self,
        connection: ChatConnection,
        mut events: mpsc::UnboundedReceiver<ChatEvent>,
    ) {
        let session = self.clone();
        let dispatch = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                session.handle_event(event).await;
            }
        });

        let mut inner = self.inner.lock().await;
        inner.abort_tasks();
        if let Some(old) = inner.connection.replace(connection) {
            old.shutdown();
        }
        inner.joined.clear();
        inner.pending.clear();
        inner.status = ChatStatus::Connecting;
        inner.settling = true;
        inner.dispatch_task = Some(dispatch);
    }

    /// Closes the connection and stops every timer.
    pub async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        inner.abort_tasks();
        if let Some(connection) = inner.connection.take() {
            connection.shutdown();
        }
        inner.joined.clear();
        inner.pending.clear();
        inner.settling = false;
        inner.status = ChatStatus::Disconnected;
    }

    pub async fn status(&self) -> ChatStatus {
        self.inner.lock().await.status
    }

    pub async fn joined(&self) -> BTreeSet<String> {
        self.inner.lock().await.joined.clone()
    }

    /// Reconciles joined rooms with the channel registry, connecting first if needed.
    ///
    /// Ignored while a connection is still settling. A new connection reconciles on its own
    /// once the server accepts the login.
    pub async fn update(&self) {
        if !self.auth.is_valid().await {
            tracing::trace!("credential is not valid, skipping chat update");
            return;
        }
        let (connected, settling) = {
            let inner = self.inner.lock().await;
            (inner.connection.is_some(), inner.settling)
        };
        if !connected {
            self.init().await;
            return;
        }
        if settling {
            tracing::trace!("chat is settling, skipping reconciliation");
            return;
        }
        self.reconcile().await;
    }

    async fn reconcile(&self) {
        let wanted: BTreeSet<String> = self.channels.usernames().await.into_iter().collect();
        let mut inner = self.inner.lock().await;

        let parts = inner
            .joined
            .difference(&wanted)
            .map(|c| Membership::Part(c.clone()));
        let joins = wanted
            .difference(&inner.joined)
            .map(|c| Membership::Join(c.clone()));
        let pending: VecDeque<_> = parts.chain(joins).collect();
        if pending.is_empty() {
            return;
        }
        tracing::debug!(operations = pending.len(), "reconciling chat rooms");
        inner.pending = pending;

        if inner.drain_task.as_ref().is_none_or(|t| t.is_finished()) {
            let session = self.clone();
            inner.drain_task = Some(tokio::spawn(async move { session.drain().await }));
        }
    }

    /// Sends one queued JOIN or PART per membership interval until the queue is empty.
    async fn drain(&self) {
        loop {
            {
                let mut inner = self.inner.lock().await;
                let Some(next) = inner.pending.pop_front() else {
                    return;
                };
                match (&inner.connection, inner.status) {
                    (Some(connection), ChatStatus::Connected) => match &next {
                        Membership::Join(channel) => {
                            tracing::debug!(%channel, "joining chat room");
                            connection.join(channel);
                        }
                        Membership::Part(channel) => {
                            tracing::debug!(%channel, "parting chat room");
                            connection.part(channel);
                        }
                    },
                    _ => tracing::debug!(?next, "chat not connected, dropping room change"),
                }
            }
            tokio::time::sleep(self.membership_interval).await;
        }
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Connected => {
                tracing::info!("connected to chat");
                {
                    let mut inner = self.inner.lock().await;
                    inner.status = ChatStatus::Connected;
                    inner.joined.clear();
                    inner.settling = true;
                    let session = self.clone();
                    let settle = self.settle;
                    if let Some(old) = inner.settle_task.replace(tokio::spawn(async move {
                        tokio::time::sleep(settle).await;
                        session.inner.lock().await.settling = false;
                    })) {
                        old.abort();
                    }
                }
                self.reconcile().await;
            }
            ChatEvent::Disconnected => {
                tracing::warn!("disconnected from chat");
                let mut inner = self.inner.lock().await;
                if inner.connection.is_some() {
                    inner.status = ChatStatus::Connecting;
                }
                inner.joined.clear();
            }
            ChatEvent::Join { channel, user } => {
                if user == self.auth.login().await.to_lowercase() {
                    tracing::debug!(%channel, "joined chat room");
                    self.inner.lock().await.joined.insert(channel);
                }
            }
            ChatEvent::Part { channel, user } => {
                if user == self.auth.login().await.to_lowercase() {
                    tracing::debug!(%channel, "left chat room");
                    self.inner.lock().await.joined.remove(&channel);
                }
            }
            ChatEvent::Message { channel } => {
                self.channels
                    .update_by_username(&channel, |c| c.activity.record_message())
                    .await;
            }
            ChatEvent::RoomState { channel, delta } => {
                tracing::debug!(%channel, ?delta, "room state");
                self.apply_delta(&channel, delta).await;
            }
            ChatEvent::Notice { channel, msg_id } => match RoomStateDelta::from_notice(&msg_id) {
                Some(delta) => self.apply_delta(&channel, delta).await,
                None => tracing::debug!(%channel, %msg_id, "chat notice"),
            },
        }
    }

    async fn apply_delta(&self, channel: &str, delta: RoomStateDelta) {
        self.channels
            .update_by_username(channel, |c| {
                c.chat_modes.apply_room_state(&delta);
                if c.id.is_empty()
                    && let Some(id) = delta.room_id
                {
                    c.id = id;
                }
            })
            .await;
    }

    /// Runs `f` on the live connection, if there is one.
    async fn with_connection(&self, action: &str, f: impl FnOnce(&ChatConnection)) {
        let inner = self.inner.lock().await;
        match (&inner.connection, inner.status) {
            (Some(connection), ChatStatus::Connected) => f(connection),
            _ => tracing::debug!(action, "chat not connected"),
        }
    }

    pub async fn message(&self, channel: &str, text: &str) {
        let channel = channel.trim_start_matches('#').to_lowercase();
        self.with_connection("message", |c| c.privmsg(&channel, text))
            .await;
    }

    pub async fn clear_chat(&self, channel: &str) {
        let channel = channel.trim_start_matches('#').to_lowercase();
        self.with_connection("clear_chat", |c| c.privmsg(&channel, "/clear"))
            .await;
    }

    /// Toggles `mode` in a configured channel through a chat command.
    pub async fn chat_mode(&self, channel: &str, mode: ChatMode, length: Option<u32>) {
        let Some(target) = self.channels.find_by_username(channel).await else {
            tracing::debug!(%channel, "no such configured channel");
            return;
        };
        let command = mode_command(mode, &target.chat_modes, length);
        self.with_connection("chat_mode", |c| c.privmsg(&target.username, &command))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{grant, valid_auth};
    use crate::auth::tokens::TokenStore;
    use crate::channels::TimedMode;
    use pretty_assertions::assert_eq;

    async fn session_with(channels: &str) -> (ChatSession, mpsc::UnboundedReceiver<String>) {
        let registry = ChannelRegistry::new();
        registry.rebuild(channels).await;
        let session = ChatSession::new(&Settings::default(), valid_auth(&[]).await, registry);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_events, rx_events) = mpsc::unbounded_channel();
        session
            .attach(ChatConnection::detached(tx), rx_events)
            .await;
        (session, rx)
    }

    async fn joined_by_me(session: &ChatSession, channels: &[&str]) {
        for channel in channels {
            session
                .handle_event(ChatEvent::Join {
                    channel: channel.to_string(),
                    user: "me".into(),
                })
                .await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconciliation_converges_one_room_at_a_time() {
        let (session, mut sent) = session_with("a b c").await;
        session.handle_event(ChatEvent::Connected).await;
        for channel in ["a", "b", "c"] {
            assert_eq!(sent.recv().await, Some(format!("JOIN #{channel}")));
        }
        joined_by_me(&session, &["a", "b", "c"]).await;

        session.channels.rebuild("b c d").await;
        // still settling
        session.update().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sent.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        session.update().await;
        let start = tokio::time::Instant::now();
        assert_eq!(sent.recv().await.as_deref(), Some("PART #a"));
        assert_eq!(sent.recv().await.as_deref(), Some("JOIN #d"));
        assert!(start.elapsed() >= Duration::from_millis(2500));

        session
            .handle_event(ChatEvent::Part {
                channel: "a".into(),
                user: "me".into(),
            })
            .await;
        joined_by_me(&session, &["d"]).await;
        assert_eq!(
            session.joined().await,
            ["b", "c", "d"].into_iter().map(String::from).collect()
        );

        // nothing left to do
        session.update().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn other_users_do_not_change_membership() {
        let (session, _sent) = session_with("a").await;
        session.handle_event(ChatEvent::Connected).await;
        session
            .handle_event(ChatEvent::Join {
                channel: "a".into(),
                user: "someone".into(),
            })
            .await;
        assert!(session.joined().await.is_empty());
    }

    #[tokio::test]
    async fn room_state_merges_and_fills_id() {
        let (session, _sent) = session_with("friend").await;
        session
            .handle_event(ChatEvent::RoomState {
                channel: "friend".into(),
                delta: RoomStateDelta {
                    emote_only: Some(true),
                    followers_only: Some(10),
                    slow: Some(0),
                    subs_only: Some(false),
                    r9k: Some(false),
                    room_id: Some("77".into()),
                },
            })
            .await;
        session
            .handle_event(ChatEvent::RoomState {
                channel: "friend".into(),
                delta: RoomStateDelta {
                    slow: Some(30),
                    room_id: Some("99".into()),
                    ..RoomStateDelta::default()
                },
            })
            .await;
        session
            .handle_event(ChatEvent::Notice {
                channel: "friend".into(),
                msg_id: "emote_only_off".into(),
            })
            .await;
        session
            .handle_event(ChatEvent::Message {
                channel: "friend".into(),
            })
            .await;

        let friend = session.channels.find_by_username("friend").await.unwrap();
        assert_eq!(friend.id, "77");
        assert!(!friend.chat_modes.emote);
        assert_eq!(friend.chat_modes.followers, TimedMode::on(10));
        assert_eq!(friend.chat_modes.slow, TimedMode::on(30));
        assert_eq!(friend.activity.total, 1);
    }

    #[tokio::test]
    async fn commands_need_a_live_connection() {
        let (session, mut sent) = session_with("friend").await;
        session.message("friend", "hello").await;
        session.clear_chat("#friend").await;
        assert!(sent.try_recv().is_err());

        session.handle_event(ChatEvent::Connected).await;
        assert_eq!(sent.recv().await.as_deref(), Some("JOIN #friend"));
        session.message("friend", "hello").await;
        session.clear_chat("#friend").await;
        session.chat_mode("friend", ChatMode::Slow, Some(20)).await;
        assert_eq!(sent.recv().await.as_deref(), Some("PRIVMSG #friend :hello"));
        assert_eq!(sent.recv().await.as_deref(), Some("PRIVMSG #friend :/clear"));
        assert_eq!(sent.recv().await.as_deref(), Some("PRIVMSG #friend :/slow 20"));

        session.destroy().await;
        session.message("friend", "hello").await;
        assert_eq!(session.status().await, ChatStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn connects_once_the_credential_turns_valid() {
        let auth = Auth::new(&Settings::default(), TokenStore::in_memory("token", "refresh"))
            .unwrap();
        let registry = ChannelRegistry::new();
        registry.rebuild("friend").await;
        let settings = Settings {
            // nothing listens here, the connection just keeps retrying
            irc_addr: "127.0.0.1:1".into(),
            ..Settings::default()
        };
        let session = ChatSession::new(&settings, auth.clone(), registry);

        session.update().await;
        assert_eq!(session.status().await, ChatStatus::Disconnected);

        grant(&auth, &[]).await;
        session.update().await;
        assert_eq!(session.status().await, ChatStatus::Connecting);

        session.destroy().await;
        assert_eq!(session.status().await, ChatStatus::Disconnected);
    }
}
