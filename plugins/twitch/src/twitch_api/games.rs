use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A category on Twitch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}

/// How [`HelixClient::get_games`] identifies a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameQuery {
    Name(String),
    Id(String),
}

impl HelixClient {
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-games>
    #[instrument(skip(self), ret)]
    pub async fn get_games(&self, query: &GameQuery) -> eyre::Result<Helix<Vec<Game>>> {
        let query_params = match query {
            GameQuery::Name(name) => [("name", name.as_str())],
            GameQuery::Id(id) => [("id", id.as_str())],
        };
        let response = self.get("games", &query_params).await?;
        Ok(response.data().map(|envelope| envelope.data))
    }
}
