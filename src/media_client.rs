use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::media::{AircraftMediaInfo, MediaSource};
use crate::providers::USER_AGENT;

/// Media and image calls get a longer budget than telemetry fetches.
pub const MEDIA_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`MediaSource`] against the photo/flight-history
/// lookup service's JSON contract.
#[derive(Clone)]
pub struct MediaLookupClient {
    client: reqwest::Client,
    base_url: String,
}

impl MediaLookupClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaSource for MediaLookupClient {
    async fn fetch_aircraft_media(&self, registration: &str) -> Result<Option<AircraftMediaInfo>> {
        let url = format!("{}/aircraft/{registration}", self.base_url);
        debug!("fetching media for {registration}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("media request to {url} failed"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(anyhow!("rate limited by media lookup service"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("media lookup error {status}: {body}"));
        }

        let info: AircraftMediaInfo = response
            .json()
            .await
            .context("media lookup returned unparseable JSON")?;
        Ok(Some(info))
    }
}
