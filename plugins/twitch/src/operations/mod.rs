//! Helix calls wired to the channel registry.
//!
//! Every operation checks that the credential is valid and carries the scope the endpoint needs
//! before touching the network. Remote errors are logged with the body Twitch sent and leave
//! the registry untouched. Per-channel operations fan out one request per channel and settle
//! each independently, so one channel's 403 does not hide the others' data.

use crate::auth::Auth;
use crate::channels::{Channel, ChannelRegistry};
use crate::twitch_api::{Helix, HelixClient};
use std::future::Future;
use tokio::task::JoinSet;

pub mod broadcaster;
pub mod channel;
pub mod chat;
pub mod polls;

#[derive(Debug, Clone)]
pub struct Operations {
    auth: Auth,
    api: HelixClient,
    channels: ChannelRegistry,
}

impl Operations {
    pub fn new(auth: Auth, api: HelixClient, channels: ChannelRegistry) -> Self {
        Self {
            auth,
            api,
            channels,
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn api(&self) -> &HelixClient {
        &self.api
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Whether `operation` may run: the credential must be valid and hold `scope`, if any.
    async fn allowed(&self, operation: &'static str, scope: Option<&'static str>) -> bool {
        if !self.auth.is_valid().await {
            tracing::debug!(operation, "skipping, credential is not valid");
            return false;
        }
        if let Some(scope) = scope
            && !self.auth.has_scope(scope).await
        {
            tracing::info!(operation, scope, "skipping, missing scope");
            return false;
        }
        true
    }

    /// The authenticated user's own channel, if it is configured and resolved.
    async fn own_channel(&self) -> Option<Channel> {
        let user_id = self.auth.user_id().await;
        self.channels.find_by_id(&user_id).await
    }

    /// Resolved channels the authenticated user owns or moderates.
    async fn managed_channels(&self) -> Vec<Channel> {
        let user_id = self.auth.user_id().await;
        self.channels
            .snapshot()
            .await
            .into_iter()
            .filter(|c| !c.id.is_empty() && c.is_managed_by(&user_id))
            .collect()
    }

    /// A configured channel by username, only once its id is known.
    async fn resolved_channel(&self, operation: &'static str, username: &str) -> Option<Channel> {
        match self.channels.find_by_username(username).await {
            Some(channel) if !channel.id.is_empty() => Some(channel),
            Some(_) => {
                tracing::debug!(operation, channel = %username, "channel id not resolved yet");
                None
            }
            None => {
                tracing::debug!(operation, channel = %username, "no such configured channel");
                None
            }
        }
    }
}

/// Unwraps the outcome of one Helix call, logging anything but success.
fn settle<T>(operation: &str, target: &str, result: eyre::Result<Helix<T>>) -> Option<T> {
    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(operation, target, error = %e, body = %e.body, "request failed");
            None
        }
        Err(e) => {
            tracing::error!(operation, target, error = ?e, "request failed");
            None
        }
    }
}

/// Issues one request per channel concurrently and waits for all of them.
///
/// Results come back in completion order, each paired with the channel it was made for.
async fn fan_out<T, F, Fut>(
    targets: Vec<Channel>,
    request: F,
) -> Vec<(Channel, eyre::Result<Helix<T>>)>
where
    T: Send + 'static,
    F: Fn(&Channel) -> Fut,
    Fut: Future<Output = eyre::Result<Helix<T>>> + Send + 'static,
{
    let mut requests = JoinSet::new();
    for channel in targets {
        let pending = request(&channel);
        requests.spawn(async move { (channel, pending.await) });
    }

    let mut settled = Vec::with_capacity(requests.len());
    while let Some(joined) = requests.join_next().await {
        match joined {
            Ok(result) => settled.push(result),
            Err(e) => tracing::error!(error = %e, "request task failed"),
        }
    }
    settled
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::tests::valid_auth;
    use crate::twitch_api::client::tests::client_for;
    use wiremock::MockServer;

    /// Operations against `server` with a valid credential holding `scopes`, for the user with
    /// id `1` and login `me`.
    pub(crate) async fn operations_for(
        server: &MockServer,
        scopes: &[&str],
        channels: &str,
    ) -> Operations {
        let registry = ChannelRegistry::new();
        registry.rebuild(channels).await;
        Operations::new(valid_auth(scopes).await, client_for(server), registry)
    }

    /// Gives `username` an id as if `update_users` had already run.
    pub(crate) async fn resolve(ops: &Operations, username: &str, id: &str) {
        let id = id.to_string();
        ops.channels
            .update_by_username(username, move |c| c.id = id)
            .await;
    }
}
