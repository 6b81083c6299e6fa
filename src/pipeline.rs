use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aircraft::MergedAircraft;
use crate::catalogs::Catalogs;
use crate::config::Config;
use crate::enrichment::Enricher;
use crate::image_processor::ImageProcessor;
use crate::media::MediaEnricher;
use crate::media_client::MediaLookupClient;
use crate::mil_cache::MilCache;
use crate::observation::Observation;
use crate::providers::{
    AdsbLolClient, AircraftProvider, Fr24Client, OpenSkyClient, fetch_observations,
};
use crate::publisher::{MqttPublisher, RunnerStats};
use crate::selection::scaffolded_payload;
use crate::snapshot::{Snapshot, build_snapshot};

/// Owns every collaborator of the fetch→fuse→enrich→publish cycle and runs
/// one cycle at a time.
pub struct Pipeline {
    config: Config,
    catalogs: Catalogs,
    providers: Vec<Box<dyn AircraftProvider>>,
    publisher: MqttPublisher,
    media: Option<MediaEnricher>,
    stats: RunnerStats,
}

impl Pipeline {
    pub fn new(
        config: Config,
        publisher: MqttPublisher,
        image_processor: Option<Arc<dyn ImageProcessor>>,
    ) -> Self {
        let catalogs = Catalogs::load(&config.datasets_dir);
        let http = reqwest::Client::new();
        let mil_cache = Arc::new(MilCache::open(
            http.clone(),
            config.mil_cache_path.clone(),
            config.mil_cache_ttl,
        ));

        let mut providers: Vec<Box<dyn AircraftProvider>> = Vec::new();
        if !config.skip_opensky {
            let credentials = config
                .osk_client_id
                .clone()
                .zip(config.osk_client_secret.clone());
            providers.push(Box::new(OpenSkyClient::new(
                http.clone(),
                credentials,
                Arc::clone(&mil_cache),
            )));
        }
        if !config.skip_adsb {
            providers.push(Box::new(AdsbLolClient::new(
                http.clone(),
                Arc::clone(&mil_cache),
            )));
        }
        if !config.skip_fr24 {
            providers.push(Box::new(Fr24Client::new(
                http.clone(),
                Arc::clone(&mil_cache),
            )));
        }
        if providers.is_empty() {
            warn!("all providers are disabled; cycles will publish empty snapshots");
        }

        let media = config.media_lookup_base_url.as_ref().map(|base| {
            MediaEnricher::new(
                Arc::new(MediaLookupClient::new(http.clone(), base.clone())),
                image_processor,
            )
        });

        Self {
            config,
            catalogs,
            providers,
            publisher,
            media,
            stats: RunnerStats::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Count a cycle-level failure toward the published stats.
    pub fn record_error(&mut self) {
        self.stats.errors += 1;
    }

    /// One complete cycle. Provider fetches fan out concurrently; once the
    /// data is in memory the snapshot build does no I/O; publication is
    /// skipped when cancellation arrived mid-cycle.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<()> {
        let cycle_start = Instant::now();
        self.stats.runs += 1;
        metrics::counter!("cycle.runs").increment(1);
        info!(
            "starting cycle {} around ({}, {}) radius {} NM",
            self.stats.runs, self.config.point.lat, self.config.point.lon,
            self.config.point.radius_nm
        );

        let now = chrono::Utc::now().timestamp();
        let observations = self.collect_observations().await;
        info!("retrieved {} observations from providers", observations.len());

        let enricher = Enricher {
            catalogs: &self.catalogs,
            private_seat_threshold: self.config.private_designation_seats,
            datasets_dir: &self.config.datasets_dir,
            airline_logo_base_url: self.config.airline_logo_base_url.as_deref(),
            country_flag_base_url: self.config.country_flag_base_url.as_deref(),
        };
        let mut snapshot = build_snapshot(
            &observations,
            &self.config.point,
            &self.config.provider_priority,
            &enricher,
            now,
        );
        metrics::gauge!("cycle.merged_aircraft").set(snapshot.planes.len() as f64);

        if let Some(media) = &self.media {
            let mut targets: Vec<&mut MergedAircraft> = Vec::new();
            if let Some(m) = snapshot.nearest.as_mut() {
                targets.push(m);
            }
            if self.config.publish_nearest_commercial {
                if let Some(m) = snapshot.nearest_commercial.as_mut() {
                    targets.push(m);
                }
            }
            media.enrich(targets).await;
        }

        if let Some(path) = self.config.write_json_path.clone() {
            if let Err(err) = write_snapshot_mirror(&path, &snapshot) {
                warn!("failed to write snapshot mirror: {err:#}");
            }
        }

        if cancel.is_cancelled() {
            info!("cancellation requested, skipping publication");
            return Ok(());
        }

        self.publish_snapshot(&snapshot).await;
        info!(
            "cycle {} completed in {:.1}s with {} aircraft",
            self.stats.runs,
            cycle_start.elapsed().as_secs_f64(),
            snapshot.planes.len()
        );
        Ok(())
    }

    async fn collect_observations(&self) -> Vec<Observation> {
        let fetches = self
            .providers
            .iter()
            .map(|provider| fetch_observations(provider.as_ref(), &self.config.point));
        futures_util::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Topic order: nearest, planes, nearest_commercial, stats. Each topic
    /// publishes independently; one failing does not suppress the rest.
    async fn publish_snapshot(&mut self, snapshot: &Snapshot) {
        if let Some(nearest) = &snapshot.nearest {
            self.publish_topic("nearest", scaffolded_payload(nearest), true)
                .await;
        }
        if self.config.publish_all_planes {
            match serde_json::to_value(&snapshot.planes) {
                Ok(planes) => self.publish_topic("planes", planes, true).await,
                Err(err) => error!("failed to serialize planes payload: {err}"),
            }
        }
        if self.config.publish_nearest_commercial {
            if let Some(nearest_commercial) = &snapshot.nearest_commercial {
                self.publish_topic(
                    "nearest_commercial",
                    scaffolded_payload(nearest_commercial),
                    true,
                )
                .await;
            }
        }

        let nearest_callsign = snapshot
            .nearest
            .as_ref()
            .and_then(|m| m.callsign.as_deref());
        let stats = self.stats.payload(snapshot.planes.len(), nearest_callsign);
        match serde_json::to_value(&stats) {
            Ok(stats) => self.publish_topic("stats", stats, false).await,
            Err(err) => error!("failed to serialize stats payload: {err}"),
        }
    }

    async fn publish_topic(&mut self, topic: &str, payload: Value, count_success: bool) {
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to serialize {topic} payload: {err}");
                self.stats.errors += 1;
                return;
            }
        };
        match self.publisher.publish(topic, bytes).await {
            Ok(()) => {
                if count_success {
                    self.stats.successful_publishes += 1;
                }
            }
            Err(err) => {
                error!("publish to {topic} failed: {err:#}");
                self.stats.errors += 1;
                metrics::counter!("mqtt.publish_error").increment(1);
            }
        }
    }

    pub async fn shutdown(&self) {
        self.publisher.disconnect().await;
        info!("publisher disconnected");
    }
}

fn write_snapshot_mirror(path: &std::path::Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let contents = serde_json::to_vec_pretty(&snapshot.to_scaffolded_value())
        .context("failed to serialize snapshot")?;
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
