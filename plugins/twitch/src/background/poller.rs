use crate::operations::Operations;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Decides how long to wait before the next poll.
///
/// Call sites only ever ask for the next delay, so a backoff policy can replace
/// [`FixedInterval`] without touching them.
pub trait SchedulePolicy: Send + 'static {
    fn next_delay(&mut self) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval(pub Duration);

impl SchedulePolicy for FixedInterval {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

/// Drives the periodic Helix reads that fill the channel registry.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    ops: Operations,
}

impl PollScheduler {
    pub fn new(ops: Operations) -> Self {
        Self { ops }
    }

    async fn ready(&self) -> bool {
        self.ops.auth().is_valid().await && !self.ops.channels().is_empty().await
    }

    async fn granted(&self, scope: &str) -> bool {
        self.ops.auth().has_scope(scope).await
    }

    /// Reads that only need to happen once per credential: chat settings, subscriptions, the
    /// ad schedule, and shield mode. Chat and ad events keep them current afterwards.
    pub async fn initial_poll(&self) {
        if !self.ready().await {
            return;
        }
        tracing::debug!("running initial poll");
        let ops = &self.ops;
        tokio::join!(
            ops.get_chat_settings(),
            async {
                if self.granted("channel:read:subscriptions").await {
                    ops.get_broadcaster_subscriptions().await;
                }
            },
            async {
                if self.granted("channel:read:ads").await {
                    ops.get_ad_schedule().await;
                }
            },
            async {
                if self.granted("moderator:manage:shield_mode").await {
                    ops.get_shield_mode_status().await;
                }
            },
        );
    }

    /// One regular poll. Usernames are resolved to ids first since every other read needs them.
    pub async fn poll_data(&self) {
        if !self.ready().await {
            tracing::trace!("skipping poll, no valid credential or no channels");
            return;
        }
        let ops = &self.ops;
        ops.update_users().await;

        tokio::join!(
            ops.get_channel_followers(),
            ops.get_streams(),
            async {
                if self.granted("user:read:moderated_channels").await {
                    ops.get_moderated_channels().await;
                }
            },
            async {
                if self.granted("channel:read:charity").await {
                    ops.get_charity_campaign().await;
                }
            },
            async {
                if self.granted("moderator:read:chatters").await {
                    ops.get_chatters().await;
                }
            },
            async {
                if self.granted("channel:read:goals").await {
                    ops.get_creator_goals().await;
                }
            },
            async {
                if self.granted("channel:manage:polls").await {
                    ops.get_polls().await;
                }
            },
            async {
                if self.granted("channel:manage:predictions").await {
                    ops.get_predictions().await;
                }
            },
        );
    }

    /// Polls forever on the cadence of `policy`. The first poll happens after the first delay.
    pub fn spawn(&self, mut policy: impl SchedulePolicy) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(policy.next_delay()).await;
                scheduler.poll_data().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelRegistry;
    use crate::operations::tests::operations_for;
    use crate::twitch_api::client::tests::client_for;
    use crate::twitch_api::HelixClient;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{any, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn fixed_interval_never_changes() {
        let mut policy = FixedInterval(Duration::from_secs(20));
        assert_eq!(policy.next_delay(), Duration::from_secs(20));
        assert_eq!(policy.next_delay(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn nothing_to_poll_without_channels_or_credential() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let scheduler = PollScheduler::new(operations_for(&server, &[], "").await);
        scheduler.poll_data().await;
        scheduler.initial_poll().await;

        let registry = ChannelRegistry::new();
        registry.rebuild("a b").await;
        let auth = crate::auth::Auth::new(
            &crate::config::Settings::default(),
            crate::auth::tokens::TokenStore::in_memory("token", "refresh"),
        )
        .unwrap();
        let api: HelixClient = client_for(&server);
        let scheduler = PollScheduler::new(Operations::new(auth, api, registry));
        scheduler.poll_data().await;
        scheduler.initial_poll().await;
    }

    #[tokio::test]
    async fn ids_are_resolved_before_streams() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": "10", "login": "a", "display_name": "A" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/followers"))
            .and(query_param("broadcaster_id", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "total": 5
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(query_param("user_id", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        // no scopes granted, so nothing else may be called
        Mock::given(any())
            .respond_with(ResponseTemplate::new(418))
            .expect(0)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &[], "a").await;
        PollScheduler::new(ops.clone()).poll_data().await;

        let a = ops.channels().find_by_username("a").await.unwrap();
        assert_eq!(a.id, "10");
        assert_eq!(a.followers_total, 5);
    }
}
