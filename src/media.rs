use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aircraft::MergedAircraft;
use crate::image_processor::ImageProcessor;

/// Thumbnails carried on a published record.
pub const MAX_PHOTOS: usize = 4;
/// Recent flights carried on a published record.
pub const MAX_FLIGHTS: usize = 5;
/// Upper bound on concurrent media fetches.
pub const MEDIA_FETCH_POOL: usize = 8;

/// Photos attached to a selected aircraft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftMedia {
    /// Full-size URL of the primary photo.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plane_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub thumbnails: Vec<String>,
    /// Re-hosted original, from the image processor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plane_image_original: Option<String>,
    /// Display-ready BMP rendition, from the image processor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plane_image_display: Option<String>,
}

/// One row of recent flight history, shaped for the display device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightRow {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub flight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub origin: Option<String>,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_yyyy_mm_dd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_time_hhmm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub departure_time_hhmm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub actual_departure_time_hhmm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub arrival_time_hhmm: Option<String>,
    pub arr_or_eta_hhmm: String,
}

/// Wire contract of the media lookup collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AircraftMediaInfo {
    #[serde(default)]
    pub images: Vec<MediaImage>,
    #[serde(default)]
    pub flights: Vec<MediaFlightRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaImage {
    #[serde(default)]
    pub full_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFlightRecord {
    #[serde(default)]
    pub flight: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub date_yyyy_mm_dd: Option<String>,
    #[serde(default)]
    pub block_time_hhmm: Option<String>,
    #[serde(default)]
    pub departure_time_hhmm: Option<String>,
    #[serde(default)]
    pub actual_departure_time_hhmm: Option<String>,
    #[serde(default)]
    pub arrival_time_hhmm: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
}

/// Photo and flight-history lookup for one registration.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// `Ok(None)` means the registration is unknown, which is data rather
    /// than an error.
    async fn fetch_aircraft_media(&self, registration: &str) -> Result<Option<AircraftMediaInfo>>;
}

/// Derive the display arrival line: an arrived flight shows "Arr <STA>",
/// anything else shows "ETA <STA>", falling back to the scheduled
/// departure and finally the bare prefix.
pub fn arr_or_eta(status: Option<&str>, arrival: Option<&str>, departure: Option<&str>) -> String {
    let time = arrival
        .or(departure)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let arrived = status
        .map(|s| s.to_ascii_lowercase().contains("arr"))
        .unwrap_or(false);
    let prefix = if arrived { "Arr" } else { "ETA" };
    match time {
        Some(time) => format!("{prefix} {time}"),
        None => prefix.to_string(),
    }
}

impl FlightRow {
    pub fn from_record(record: &MediaFlightRecord) -> Self {
        Self {
            flight: record.flight.clone(),
            origin: record.origin.clone(),
            destination: record
                .destination
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            date_yyyy_mm_dd: record.date_yyyy_mm_dd.clone(),
            block_time_hhmm: record.block_time_hhmm.clone(),
            departure_time_hhmm: record.departure_time_hhmm.clone(),
            actual_departure_time_hhmm: record.actual_departure_time_hhmm.clone(),
            arrival_time_hhmm: record.arrival_time_hhmm.clone(),
            arr_or_eta_hhmm: arr_or_eta(
                record.status_text.as_deref(),
                record.arrival_time_hhmm.as_deref(),
                record.departure_time_hhmm.as_deref(),
            ),
        }
    }
}

/// Attaches photos, flight history, and device lookup keys to the selected
/// aircraft. Failures land in `media_errors` on the record; the cycle never
/// aborts over media.
pub struct MediaEnricher {
    source: Arc<dyn MediaSource>,
    processor: Option<Arc<dyn ImageProcessor>>,
}

impl MediaEnricher {
    pub fn new(source: Arc<dyn MediaSource>, processor: Option<Arc<dyn ImageProcessor>>) -> Self {
        Self { source, processor }
    }

    /// Enrich the selected records in place. Fetches are deduplicated by
    /// registration and run in a bounded concurrent pool.
    pub async fn enrich(&self, targets: Vec<&mut MergedAircraft>) {
        let mut registrations: Vec<String> = targets
            .iter()
            .filter_map(|m| m.registration.clone())
            .collect();
        registrations.sort();
        registrations.dedup();
        if registrations.is_empty() {
            return;
        }

        let concurrency = MEDIA_FETCH_POOL.min(registrations.len()).max(1);
        let results: HashMap<String, Result<Option<AircraftMediaInfo>, String>> =
            futures_util::stream::iter(registrations.into_iter().map(|registration| {
                let source = Arc::clone(&self.source);
                async move {
                    let result = source
                        .fetch_aircraft_media(&registration)
                        .await
                        .map_err(|err| format!("{err:#}"));
                    (registration, result)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for target in targets {
            self.apply(target, &results).await;
        }
    }

    async fn apply(
        &self,
        m: &mut MergedAircraft,
        results: &HashMap<String, Result<Option<AircraftMediaInfo>, String>>,
    ) {
        let Some(registration) = m.registration.clone() else {
            return;
        };

        // Keys the display device uses to select local assets.
        m.airline_key = m.airline_iata.clone().or_else(|| m.airline_icao.clone());
        m.plane_key = Some(registration.clone());

        let info = match results.get(&registration) {
            Some(Ok(Some(info))) => info,
            Some(Ok(None)) => {
                debug!("no media found for {registration}");
                return;
            }
            Some(Err(err)) => {
                warn!("media lookup for {registration} failed: {err}");
                m.media_errors.push(err.clone());
                return;
            }
            None => return,
        };

        let mut media = AircraftMedia::default();
        if let Some(first) = info.images.first() {
            media.plane_image = first.full_url.clone().or_else(|| first.thumbnail_url.clone());
        }
        media.thumbnails = info
            .images
            .iter()
            .take(MAX_PHOTOS)
            .filter_map(|image| image.thumbnail_url.clone())
            .collect();

        if let (Some(processor), Some(image_url)) = (&self.processor, media.plane_image.clone()) {
            match processor.process(&image_url, &registration).await {
                Ok(processed) => {
                    media.plane_image_original = processed.original_url;
                    media.plane_image_display = processed.display_url;
                }
                Err(err) => {
                    warn!("image processing for {registration} failed: {err:#}");
                    m.media_errors.push(format!("image processing failed: {err}"));
                }
            }
        }

        if media != AircraftMedia::default() {
            m.media = Some(media);
        }
        m.history = info
            .flights
            .iter()
            .take(MAX_FLIGHTS)
            .map(FlightRow::from_record)
            .collect();
    }
}
