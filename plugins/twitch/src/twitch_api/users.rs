use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub profile_image_url: String,
}

/// Which key [`HelixClient::get_users`] looks users up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey {
    Login,
    Id,
}

impl UserKey {
    fn param(self) -> &'static str {
        match self {
            UserKey::Login => "login",
            UserKey::Id => "id",
        }
    }
}

impl HelixClient {
    /// Looks up users by login name or id. Unknown users are simply missing from the result.
    ///
    /// # Required Scopes
    ///
    /// None.
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-users>
    #[instrument(skip(self), ret)]
    pub async fn get_users(
        &self,
        key: UserKey,
        values: &[String],
    ) -> eyre::Result<Helix<Vec<User>>> {
        let mut users = Vec::new();
        // Helix accepts at most 100 lookups per request.
        for chunk in values.chunks(100) {
            let query_params: Vec<(&str, &str)> =
                chunk.iter().map(|v| (key.param(), v.as_str())).collect();
            let response = self.get("users", &query_params).await?;
            match response.data::<User>() {
                Ok(envelope) => users.extend(envelope.data),
                Err(e) => return Ok(Err(e)),
            }
        }
        tracing::debug!(count = users.len(), "fetched users");
        Ok(Ok(users))
    }
}
