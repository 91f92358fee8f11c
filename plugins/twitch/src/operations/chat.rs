//! Chat settings, chatters, and moderation.

use super::{Operations, fan_out, settle};
use crate::channels::{ChatModes, TimedMode};
use crate::twitch_api::chat::{AnnouncementColor, ChatSettingsUpdate};
use std::collections::HashSet;
use tokio_stream::StreamExt;

/// Slow mode wait time bounds, in seconds.
pub const SLOW_MODE_SECONDS: (u32, u32) = (3, 120);
/// Follower-only mode bounds, in minutes (90 days).
pub const FOLLOWER_MODE_MINUTES: (u32, u32) = (0, 129_600);
/// The only non-moderator chat delays Twitch accepts, in seconds.
pub const CHAT_DELAY_SECONDS: [u32; 3] = [2, 4, 6];

/// One chat setting to change.
///
/// The boolean modes toggle. The timed modes take a length: zero (or `None`) turns the mode
/// off, the length already in effect toggles the mode, and anything else turns it on at that
/// length, clamped to what Twitch allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSettingChange {
    EmoteMode,
    SubscriberMode,
    UniqueChatMode,
    /// Minimum follow age in minutes.
    FollowerMode(Option<u32>),
    /// Seconds between messages.
    SlowMode(u32),
    /// Seconds non-moderator messages are held back.
    NonModeratorDelay(u32),
}

/// Builds the update body for `change` given the current chat modes.
pub fn chat_settings_update(current: &ChatModes, change: ChatSettingChange) -> ChatSettingsUpdate {
    match change {
        ChatSettingChange::EmoteMode => ChatSettingsUpdate {
            emote_mode: Some(!current.emote),
            ..ChatSettingsUpdate::default()
        },
        ChatSettingChange::SubscriberMode => ChatSettingsUpdate {
            subscriber_mode: Some(!current.subscriber),
            ..ChatSettingsUpdate::default()
        },
        ChatSettingChange::UniqueChatMode => ChatSettingsUpdate {
            unique_chat_mode: Some(!current.unique),
            ..ChatSettingsUpdate::default()
        },
        ChatSettingChange::FollowerMode(minutes) => {
            let (enabled, length) = timed_update(
                current.followers,
                minutes.unwrap_or(0),
                |m| m.clamp(FOLLOWER_MODE_MINUTES.0, FOLLOWER_MODE_MINUTES.1),
            );
            ChatSettingsUpdate {
                follower_mode: Some(enabled),
                follower_mode_duration: length,
                ..ChatSettingsUpdate::default()
            }
        }
        ChatSettingChange::SlowMode(seconds) => {
            let (enabled, length) = timed_update(current.slow, seconds, |s| {
                s.clamp(SLOW_MODE_SECONDS.0, SLOW_MODE_SECONDS.1)
            });
            ChatSettingsUpdate {
                slow_mode: Some(enabled),
                slow_mode_wait_time: length,
                ..ChatSettingsUpdate::default()
            }
        }
        ChatSettingChange::NonModeratorDelay(seconds) => {
            let (enabled, length) = timed_update(current.non_moderator_delay, seconds, |s| {
                CHAT_DELAY_SECONDS
                    .into_iter()
                    .find(|&allowed| s <= allowed)
                    .unwrap_or(CHAT_DELAY_SECONDS[2])
            });
            ChatSettingsUpdate {
                non_moderator_chat_delay: Some(enabled),
                non_moderator_chat_delay_duration: length,
                ..ChatSettingsUpdate::default()
            }
        }
    }
}

/// Returns the new enabled flag and, if the length changes, the new length.
fn timed_update(
    current: TimedMode,
    requested: u32,
    clamp: impl Fn(u32) -> u32,
) -> (bool, Option<u32>) {
    if requested == 0 {
        (false, None)
    } else if requested == current.length {
        (!current.enabled, None)
    } else {
        (true, Some(clamp(requested)))
    }
}

impl Operations {
    /// Counts the chatters of every channel the authenticated user owns or moderates.
    pub async fn get_chatters(&self) {
        if !self
            .allowed("get_chatters", Some("moderator:read:chatters"))
            .await
        {
            return;
        }
        let moderator_id = self.auth.user_id().await;
        let targets = self.managed_channels().await;

        let api = self.api.clone();
        let settled = fan_out(targets, |channel| {
            let api = api.clone();
            let broadcaster_id = channel.id.clone();
            let moderator_id = moderator_id.clone();
            async move { api.get_chatters_total(&broadcaster_id, &moderator_id).await }
        })
        .await;

        for (channel, result) in settled {
            if let Some(total) = settle("get_chatters", &channel.username, result) {
                self.channels
                    .update_by_id(&channel.id, |c| c.chatters = total)
                    .await;
            }
        }
    }

    /// Refreshes the chat modes of every channel the authenticated user owns or moderates.
    ///
    /// The non-moderator chat delay is only reported when asking as a moderator, which needs
    /// `moderator:manage:chat_settings`.
    pub async fn get_chat_settings(&self) {
        if !self.allowed("get_chat_settings", None).await {
            return;
        }
        let as_moderator = self.auth.has_scope("moderator:manage:chat_settings").await;
        let moderator_id = self.auth.user_id().await;
        let targets = self.managed_channels().await;

        let api = self.api.clone();
        let settled = fan_out(targets, |channel| {
            let api = api.clone();
            let broadcaster_id = channel.id.clone();
            let moderator_id = as_moderator.then(|| moderator_id.clone());
            async move {
                api.get_chat_settings(&broadcaster_id, moderator_id.as_deref())
                    .await
            }
        })
        .await;

        for (channel, result) in settled {
            if let Some(Some(settings)) = settle("get_chat_settings", &channel.username, result) {
                self.channels
                    .update_by_id(&channel.id, |c| c.chat_modes.apply_settings(&settings))
                    .await;
            }
        }
    }

    pub async fn update_chat_settings(&self, username: &str, change: ChatSettingChange) {
        if !self
            .allowed("update_chat_settings", Some("moderator:manage:chat_settings"))
            .await
        {
            return;
        }
        let Some(channel) = self.resolved_channel("update_chat_settings", username).await else {
            return;
        };
        let moderator_id = self.auth.user_id().await;

        let update = chat_settings_update(&channel.chat_modes, change);
        tracing::debug!(channel = %channel.username, ?change, ?update, "updating chat settings");
        let result = self
            .api
            .update_chat_settings(&channel.id, &moderator_id, &update)
            .await;
        if let Some(Some(settings)) = settle("update_chat_settings", &channel.username, result) {
            self.channels
                .update_by_id(&channel.id, |c| c.chat_modes.apply_settings(&settings))
                .await;
        }
    }

    pub async fn send_chat_announcement(
        &self,
        username: &str,
        message: &str,
        color: AnnouncementColor,
    ) {
        if !self
            .allowed("send_chat_announcement", Some("moderator:manage:announcements"))
            .await
        {
            return;
        }
        let Some(channel) = self.resolved_channel("send_chat_announcement", username).await else {
            return;
        };
        let moderator_id = self.auth.user_id().await;
        let result = self
            .api
            .send_chat_announcement(&channel.id, &moderator_id, message, color)
            .await;
        settle("send_chat_announcement", &channel.username, result);
    }

    /// Deletes one message by id, or every message when `message_id` is `None`.
    pub async fn delete_chat_messages(&self, username: &str, message_id: Option<&str>) {
        if !self
            .allowed("delete_chat_messages", Some("moderator:manage:chat_messages"))
            .await
        {
            return;
        }
        let Some(channel) = self.resolved_channel("delete_chat_messages", username).await else {
            return;
        };
        let moderator_id = self.auth.user_id().await;
        let result = self
            .api
            .delete_chat_messages(&channel.id, &moderator_id, message_id)
            .await;
        if settle("delete_chat_messages", &channel.username, result).is_some() {
            tracing::info!(channel = %channel.username, ?message_id, "deleted chat messages");
        }
    }

    pub async fn get_shield_mode_status(&self) {
        if !self
            .allowed("get_shield_mode_status", Some("moderator:manage:shield_mode"))
            .await
        {
            return;
        }
        let moderator_id = self.auth.user_id().await;
        let targets = self.managed_channels().await;

        let api = self.api.clone();
        let settled = fan_out(targets, |channel| {
            let api = api.clone();
            let broadcaster_id = channel.id.clone();
            let moderator_id = moderator_id.clone();
            async move {
                api.get_shield_mode_status(&broadcaster_id, &moderator_id)
                    .await
            }
        })
        .await;

        for (channel, result) in settled {
            if let Some(Some(status)) = settle("get_shield_mode_status", &channel.username, result)
            {
                self.channels
                    .update_by_id(&channel.id, |c| c.shield_mode = status.is_active)
                    .await;
            }
        }
    }

    /// Flags the configured channels the authenticated user moderates.
    ///
    /// Nothing changes unless every page was fetched.
    pub async fn get_moderated_channels(&self) {
        if !self
            .allowed("get_moderated_channels", Some("user:read:moderated_channels"))
            .await
        {
            return;
        }
        let user_id = self.auth.user_id().await;

        let mut moderated = HashSet::new();
        {
            let pages = self.api.list_moderated_channels(&user_id);
            let mut pages = std::pin::pin!(pages);
            while let Some(channel) = pages.next().await {
                match channel {
                    Ok(channel) => {
                        moderated.insert(channel.broadcaster_id);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to list moderated channels");
                        return;
                    }
                }
            }
        }

        tracing::debug!(count = moderated.len(), "fetched moderated channels");
        self.channels
            .update_all(|c| c.is_moderator = !c.id.is_empty() && moderated.contains(&c.id))
            .await;
    }

    /// Zeroes the running message total of a channel. Local only.
    pub async fn reset_chat_total(&self, username: &str) {
        if !self
            .channels
            .update_by_username(username, |c| c.activity.reset_total())
            .await
        {
            tracing::debug!(channel = %username, "no such configured channel");
        }
    }
}
