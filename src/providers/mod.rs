//! Provider clients: each turns one upstream traffic API into the common
//! [`Observation`](crate::observation::Observation) shape.

pub mod adsb_lol;
pub mod fr24;
pub mod opensky;

pub use adsb_lol::AdsbLolClient;
pub use fr24::Fr24Client;
pub use opensky::OpenSkyClient;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::geo::PointOfInterest;
use crate::observation::{Observation, ProviderId};

/// Total timeout for one provider request.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// User agent attached to every upstream request.
pub const USER_AGENT: &str = "SkyWatch/1.0 (+reqwest)";

#[async_trait]
pub trait AircraftProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Fetch a bounding-box snapshot around the point and normalize it.
    async fn fetch(&self, point: &PointOfInterest) -> Result<Vec<Observation>>;
}

/// Fetch from one provider with the per-cycle policy applied: one retry on
/// failure, then give up and contribute nothing. A provider outage must
/// never take the cycle down.
pub async fn fetch_observations(
    provider: &dyn AircraftProvider,
    point: &PointOfInterest,
) -> Vec<Observation> {
    for attempt in 0..2 {
        match provider.fetch(point).await {
            Ok(observations) => {
                info!("{}: {} aircraft", provider.id(), observations.len());
                metrics::counter!("provider.fetch.ok", "provider" => provider.id().as_str())
                    .increment(1);
                metrics::gauge!("provider.aircraft", "provider" => provider.id().as_str())
                    .set(observations.len() as f64);
                return observations;
            }
            Err(err) if attempt == 0 => {
                warn!("{} fetch failed, retrying once: {err:#}", provider.id());
            }
            Err(err) => {
                error!("{} fetch failed: {err:#}", provider.id());
                metrics::counter!("provider.fetch.error", "provider" => provider.id().as_str())
                    .increment(1);
            }
        }
    }
    Vec::new()
}
