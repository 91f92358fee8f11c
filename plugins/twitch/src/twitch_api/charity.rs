use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A currency amount in minor units: `value` 1550 with 2 decimal places is 15.50.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharityAmount {
    pub value: i64,
    pub decimal_places: u32,
    pub currency: String,
}

impl CharityAmount {
    pub fn as_f64(&self) -> f64 {
        self.value as f64 / 10f64.powi(self.decimal_places as i32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharityCampaign {
    pub id: String,
    pub charity_name: String,
    #[serde(default)]
    pub charity_description: String,
    #[serde(default)]
    pub charity_logo: String,
    #[serde(default)]
    pub charity_website: String,
    pub current_amount: CharityAmount,
    pub target_amount: Option<CharityAmount>,
}

impl HelixClient {
    /// Returns the running charity campaign, if any.
    ///
    /// # Required Scopes
    ///
    /// * `channel:read:charity`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-charity-campaign>
    #[instrument(skip(self), ret)]
    pub async fn get_charity_campaign(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Option<CharityCampaign>>> {
        let response = self
            .get("charity/campaigns", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units() {
        let amount = CharityAmount {
            value: 1550,
            decimal_places: 2,
            currency: "USD".into(),
        };
        assert!((amount.as_f64() - 15.5).abs() < f64::EPSILON);
    }
}
