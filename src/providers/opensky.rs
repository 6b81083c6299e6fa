use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::geo::{PointOfInterest, bounding_box};
use crate::mil_cache::MilCache;
use crate::observation::{Observation, ProviderId, clean, meters_to_feet, mps_to_fpm, mps_to_knots};
use crate::providers::{AircraftProvider, PROVIDER_TIMEOUT, USER_AGENT};

pub const DEFAULT_API_BASE: &str = "https://opensky-network.org/api";
pub const DEFAULT_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

/// OpenSky Network client. Uses OAuth2 client-credentials when configured
/// and falls back to anonymous access when the token fetch fails.
pub struct OpenSkyClient {
    client: reqwest::Client,
    api_base: String,
    token_url: String,
    credentials: Option<(String, String)>,
    mil_cache: Arc<MilCache>,
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    time: Option<i64>,
    states: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OpenSkyClient {
    pub fn new(
        client: reqwest::Client,
        credentials: Option<(String, String)>,
        mil_cache: Arc<MilCache>,
    ) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials,
            mil_cache,
        }
    }

    async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .context("token request failed")?
            .error_for_status()
            .context("token endpoint rejected request")?;

        let token: TokenResponse = response
            .json()
            .await
            .context("token response missing access_token")?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl AircraftProvider for OpenSkyClient {
    fn id(&self) -> ProviderId {
        ProviderId::Opensky
    }

    async fn fetch(&self, point: &PointOfInterest) -> Result<Vec<Observation>> {
        let bbox = bounding_box(point.lat, point.lon, point.radius_nm);
        let mut request = self
            .client
            .get(format!("{}/states/all", self.api_base))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("lamin", format!("{:.6}", bbox.south)),
                ("lamax", format!("{:.6}", bbox.north)),
                ("lomin", format!("{:.6}", bbox.west)),
                ("lomax", format!("{:.6}", bbox.east)),
            ])
            .timeout(PROVIDER_TIMEOUT);

        if let Some((client_id, client_secret)) = &self.credentials {
            match self.access_token(client_id, client_secret).await {
                Ok(token) => request = request.bearer_auth(token),
                Err(err) => warn!("OpenSky OAuth failed, going anonymous: {err:#}"),
            }
        }

        let response: StatesResponse = request
            .send()
            .await
            .context("states request failed")?
            .error_for_status()
            .context("states endpoint rejected request")?
            .json()
            .await
            .context("states response is not valid JSON")?;

        let now = response.time.unwrap_or_else(|| chrono::Utc::now().timestamp());
        let mut observations = Vec::new();
        for state in response.states.unwrap_or_default() {
            let Some(mut obs) = parse_state(now, &state) else {
                debug!("skipping malformed OpenSky state vector");
                continue;
            };
            obs.is_military = self.mil_cache.lookup(&obs.hex).await;
            observations.push(obs);
        }
        Ok(observations)
    }
}

/// Normalize one OpenSky state vector. The wire format is a positional
/// array: [icao24, callsign, origin_country, time_position, last_contact,
/// lon, lat, baro_altitude, on_ground, velocity, true_track, vertical_rate,
/// sensors, geo_altitude, squawk, ...]. Altitudes are meters, speeds m/s.
pub fn parse_state(now: i64, state: &[Value]) -> Option<Observation> {
    let hex = state.first().and_then(Value::as_str).map(str::trim)?;
    if hex.is_empty() {
        return None;
    }

    let mut obs = Observation::new(ProviderId::Opensky, hex);
    obs.callsign = state.get(1).and_then(Value::as_str).and_then(clean);
    obs.origin_country = state.get(2).and_then(Value::as_str).and_then(clean);
    obs.longitude = state.get(5).and_then(Value::as_f64);
    obs.latitude = state.get(6).and_then(Value::as_f64);
    obs.on_ground = state.get(8).and_then(Value::as_bool);
    obs.ground_speed_kt = state.get(9).and_then(Value::as_f64).map(mps_to_knots);
    obs.track_deg = state.get(10).and_then(Value::as_f64);
    obs.vertical_rate_fpm = state.get(11).and_then(Value::as_f64).map(mps_to_fpm);
    obs.squawk = state.get(14).and_then(Value::as_str).and_then(clean);

    // Geometric altitude preferred, barometric fallback.
    let altitude_m = state
        .get(13)
        .and_then(Value::as_f64)
        .or_else(|| state.get(7).and_then(Value::as_f64));
    obs.altitude_ft = altitude_m.map(meters_to_feet);

    let time_position = state.get(3).and_then(Value::as_i64);
    let last_contact = state.get(4).and_then(Value::as_i64);
    let position_ts = last_contact.or(time_position);
    obs.position_timestamp = position_ts;
    obs.age_sec = position_ts.map(|ts| ((now - ts) as f64).max(0.0));

    obs.require_full_position();
    Some(obs)
}
