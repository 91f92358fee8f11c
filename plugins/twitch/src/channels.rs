//! The local mirror of every configured channel.
//!
//! REST polling and the chat session both write into the same [`Channel`] entries, but they
//! touch disjoint fields: REST owns live/viewer/title/category/moderation/extended state and
//! chat owns chat modes and activity. Writers always look a channel up by key at write time, so
//! a write that races a [`ChannelRegistry::rebuild`] lands on the new list or on nothing.

use crate::activity::ChatActivity;
use crate::chat::irc::RoomStateDelta;
use crate::twitch_api::ads::AdSchedule;
use crate::twitch_api::charity::CharityCampaign;
use crate::twitch_api::chat::ChatSettings;
use crate::twitch_api::clips::CreatedClip;
use crate::twitch_api::goals::CreatorGoal;
use crate::twitch_api::polls::Poll;
use crate::twitch_api::predictions::Prediction;
use crate::twitch_api::subscriptions::SubscriptionSummary;
use jiff::Timestamp;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A mode that is either off or on with a length.
///
/// `length` keeps the last known value while the mode is off, so that re-submitting the same
/// length can be recognised as a toggle. Slow mode counts seconds, followers-only mode and the
/// non-moderator chat delay count minutes and seconds respectively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimedMode {
    pub enabled: bool,
    pub length: u32,
}

impl TimedMode {
    pub fn on(length: u32) -> Self {
        Self {
            enabled: true,
            length,
        }
    }

    pub fn off(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChatModes {
    pub emote: bool,
    pub followers: TimedMode,
    pub slow: TimedMode,
    pub subscriber: bool,
    pub unique: bool,
    pub non_moderator_delay: TimedMode,
}

impl ChatModes {
    /// Merges a room-state snapshot or delta from chat. Absent fields are left alone.
    pub fn apply_room_state(&mut self, delta: &RoomStateDelta) {
        if let Some(emote) = delta.emote_only {
            self.emote = emote;
        }
        if let Some(followers) = delta.followers_only {
            // -1 is chat's way of saying off
            self.followers = match u32::try_from(followers) {
                Ok(minutes) => TimedMode::on(minutes),
                Err(_) => self.followers.off(),
            };
        }
        if let Some(slow) = delta.slow {
            self.slow = if slow == 0 {
                self.slow.off()
            } else {
                TimedMode::on(slow)
            };
        }
        if let Some(subscriber) = delta.subs_only {
            self.subscriber = subscriber;
        }
        if let Some(unique) = delta.r9k {
            self.unique = unique;
        }
    }

    /// Replaces every mode with the REST view of the chat settings.
    pub fn apply_settings(&mut self, settings: &ChatSettings) {
        self.emote = settings.emote_mode;
        self.followers = timed(
            self.followers,
            settings.follower_mode,
            settings.follower_mode_duration,
        );
        self.slow = timed(self.slow, settings.slow_mode, settings.slow_mode_wait_time);
        self.subscriber = settings.subscriber_mode;
        self.unique = settings.unique_chat_mode;
        if let Some(enabled) = settings.non_moderator_chat_delay {
            self.non_moderator_delay = timed(
                self.non_moderator_delay,
                enabled,
                settings.non_moderator_chat_delay_duration,
            );
        }
    }
}

fn timed(current: TimedMode, enabled: bool, length: Option<u32>) -> TimedMode {
    match (enabled, length) {
        (true, Some(length)) => TimedMode::on(length),
        (true, None) => TimedMode::on(0),
        (false, _) => current.off(),
    }
}

/// Broadcaster-only state, filled when the authenticated user owns the channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcasterState {
    pub poll: Option<Poll>,
    pub prediction: Option<Prediction>,
    pub goals: Vec<CreatorGoal>,
    pub charity: Option<CharityCampaign>,
    pub subscriptions: Option<SubscriptionSummary>,
    pub ad_schedule: Option<AdSchedule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    pub username: String,
    pub display_name: String,
    /// Numeric Twitch id; empty until resolved.
    pub id: String,
    pub is_moderator: bool,
    /// When the current stream started, or `None` while offline.
    pub live_since: Option<Timestamp>,
    pub viewers: u64,
    pub chatters: u64,
    pub followers_total: u64,
    pub category: String,
    pub category_id: String,
    pub title: String,
    pub content_classification_labels: Vec<String>,
    pub delay: u32,
    pub branded_content: bool,
    pub shield_mode: bool,
    pub chat_modes: ChatModes,
    pub activity: ChatActivity,
    pub broadcaster: BroadcasterState,
    /// The clip most recently created here through this adapter.
    pub last_clip: Option<CreatedClip>,
}

impl Channel {
    pub fn new(username: &str, display_name: &str) -> Self {
        Self {
            username: username.to_lowercase(),
            display_name: display_name.to_string(),
            id: String::new(),
            is_moderator: false,
            live_since: None,
            viewers: 0,
            chatters: 0,
            followers_total: 0,
            category: String::new(),
            category_id: String::new(),
            title: String::new(),
            content_classification_labels: Vec::new(),
            delay: 0,
            branded_content: false,
            shield_mode: false,
            chat_modes: ChatModes::default(),
            activity: ChatActivity::new(),
            broadcaster: BroadcasterState::default(),
            last_clip: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live_since.is_some()
    }

    /// Whether the authenticated user can act as a moderator here.
    pub fn is_managed_by(&self, user_id: &str) -> bool {
        self.is_moderator || (!self.id.is_empty() && self.id == user_id)
    }

    pub fn set_offline(&mut self) {
        self.live_since = None;
        self.viewers = 0;
    }
}

/// Parses configuration text into a sorted channel list.
///
/// Tokens are separated by spaces and/or commas and take the form `username` or
/// `username:DisplayName`.
pub fn parse_channels(text: &str) -> Vec<Channel> {
    let mut channels: Vec<Channel> = text
        .replace(',', " ")
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once(':') {
            Some((username, display_name)) => Channel::new(username, display_name),
            None => Channel::new(token, token),
        })
        .collect();
    channels.sort_by(|a, b| a.username.cmp(&b.username));
    channels
}

/// Shared, cheaply clonable handle to the channel list.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<Mutex<Vec<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entire list from configuration text. Accumulated state is discarded.
    pub async fn rebuild(&self, config_text: &str) {
        let channels = parse_channels(config_text);
        tracing::debug!(count = channels.len(), "rebuilt channel registry");
        *self.channels.lock().await = channels;
    }

    pub async fn snapshot(&self) -> Vec<Channel> {
        self.channels.lock().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.lock().await.is_empty()
    }

    pub async fn usernames(&self) -> Vec<String> {
        self.channels
            .lock()
            .await
            .iter()
            .map(|c| c.username.clone())
            .collect()
    }

    /// Ids of every channel whose id has been resolved.
    pub async fn resolved_ids(&self) -> Vec<String> {
        self.channels
            .lock()
            .await
            .iter()
            .filter(|c| !c.id.is_empty())
            .map(|c| c.id.clone())
            .collect()
    }

    pub async fn find_by_username(&self, username: &str) -> Option<Channel> {
        let username = username.trim_start_matches('#').to_lowercase();
        self.channels
            .lock()
            .await
            .iter()
            .find(|c| c.username == username)
            .cloned()
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Channel> {
        if id.is_empty() {
            return None;
        }
        self.channels
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Applies `f` to the channel with the given username, returning whether one was found.
    pub async fn update_by_username(&self, username: &str, f: impl FnOnce(&mut Channel)) -> bool {
        let username = username.trim_start_matches('#').to_lowercase();
        let mut channels = self.channels.lock().await;
        match channels.iter_mut().find(|c| c.username == username) {
            Some(channel) => {
                f(channel);
                true
            }
            None => false,
        }
    }

    /// Applies `f` to the channel with the given id, returning whether one was found.
    pub async fn update_by_id(&self, id: &str, f: impl FnOnce(&mut Channel)) -> bool {
        if id.is_empty() {
            return false;
        }
        let mut channels = self.channels.lock().await;
        match channels.iter_mut().find(|c| c.id == id) {
            Some(channel) => {
                f(channel);
                true
            }
            None => false,
        }
    }

    pub async fn update_all(&self, mut f: impl FnMut(&mut Channel)) {
        for channel in self.channels.lock().await.iter_mut() {
            f(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(channels: &[Channel]) -> Vec<(String, String)> {
        channels
            .iter()
            .map(|c| (c.username.clone(), c.display_name.clone()))
            .collect()
    }

    #[test]
    fn parses_mixed_separators() {
        let channels = parse_channels("Zed, alpha:Alpha_Display  Beta,,");
        assert_eq!(
            names(&channels),
            vec![
                ("alpha".to_string(), "Alpha_Display".to_string()),
                ("beta".to_string(), "Beta".to_string()),
                ("zed".to_string(), "Zed".to_string()),
            ]
        );
        assert!(channels.iter().all(|c| c.id.is_empty()));
        assert_eq!(channels[0].activity.buckets().count(), 60);
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let registry = ChannelRegistry::new();
        registry.rebuild("b, a:Ay c").await;
        let first = registry.snapshot().await;
        registry.rebuild("b, a:Ay c").await;
        let second = registry.snapshot().await;
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn rebuild_discards_state() {
        let registry = ChannelRegistry::new();
        registry.rebuild("a").await;
        registry
            .update_by_username("A", |c| {
                c.id = "1".into();
                c.activity.record_message();
            })
            .await;
        assert!(registry.find_by_id("1").await.is_some());

        registry.rebuild("a").await;
        let channel = registry.find_by_username("#a").await.unwrap();
        assert_eq!(channel.id, "");
        assert_eq!(channel.activity.total, 0);
    }

    #[tokio::test]
    async fn missing_channels_are_no_ops() {
        let registry = ChannelRegistry::new();
        registry.rebuild("a").await;
        assert!(!registry.update_by_username("b", |c| c.viewers = 5).await);
        assert!(!registry.update_by_id("", |c| c.viewers = 5).await);
        assert_eq!(registry.find_by_username("a").await.unwrap().viewers, 0);
    }

    #[test]
    fn room_state_delta_only_touches_present_fields() {
        let mut modes = ChatModes::default();
        modes.apply_room_state(&RoomStateDelta {
            emote_only: Some(true),
            followers_only: Some(10),
            slow: Some(30),
            subs_only: Some(false),
            r9k: Some(true),
            room_id: None,
        });
        modes.apply_room_state(&RoomStateDelta {
            slow: Some(0),
            ..RoomStateDelta::default()
        });
        assert_eq!(
            modes,
            ChatModes {
                emote: true,
                followers: TimedMode::on(10),
                slow: TimedMode {
                    enabled: false,
                    length: 30
                },
                subscriber: false,
                unique: true,
                non_moderator_delay: TimedMode::default(),
            }
        );

        modes.apply_room_state(&RoomStateDelta {
            followers_only: Some(-1),
            ..RoomStateDelta::default()
        });
        assert_eq!(
            modes.followers,
            TimedMode {
                enabled: false,
                length: 10
            }
        );
        assert!(modes.emote);
    }

    #[test]
    fn rest_settings_share_representation() {
        let mut modes = ChatModes::default();
        modes.apply_settings(&ChatSettings {
            broadcaster_id: "1".into(),
            emote_mode: false,
            follower_mode: true,
            follower_mode_duration: Some(0),
            slow_mode: false,
            slow_mode_wait_time: None,
            subscriber_mode: true,
            unique_chat_mode: false,
            non_moderator_chat_delay: Some(true),
            non_moderator_chat_delay_duration: Some(4),
        });
        assert_eq!(modes.followers, TimedMode::on(0));
        assert_eq!(modes.slow, TimedMode::default());
        assert!(modes.subscriber);
        assert_eq!(modes.non_moderator_delay, TimedMode::on(4));
    }
}
