use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_ADSB_API_BASE: &str = "https://api.adsb.lol";
pub const DEFAULT_TTL: Duration = Duration::from_secs(21_600);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// One cached military-status verdict.
///
/// `mil` is three-valued: `Some(true)`/`Some(false)` from the upstream
/// database, `None` when the lookup failed. Failures are cached too so a
/// flapping endpoint is not re-queried every cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MilCacheEntry {
    pub mil: Option<bool>,
    /// Epoch seconds at which the verdict was recorded.
    pub ts: f64,
}

/// TTL-bounded hex → military-status cache backed by the adsb.lol hex
/// endpoint and persisted to disk after every update.
///
/// This is the only mutable state shared between provider clients; the map
/// and its disk writes are serialized behind one lock.
pub struct MilCache {
    client: reqwest::Client,
    api_base: String,
    path: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<String, MilCacheEntry>>,
}

impl MilCache {
    /// Open the cache, loading any previously persisted entries. A missing
    /// or corrupt file starts the cache empty.
    pub fn open(client: reqwest::Client, path: PathBuf, ttl: Duration) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, MilCacheEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("ignoring corrupt mil cache {}: {err}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!("mil cache opened with {} entries", entries.len());

        Self {
            client,
            api_base: DEFAULT_ADSB_API_BASE.to_string(),
            path,
            ttl,
            entries: Mutex::new(entries),
        }
    }

    /// Point lookups at a different endpoint (tests, self-hosted mirrors).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Resolve the military status of a hex, hitting the network only when
    /// no fresh cache entry exists.
    pub async fn lookup(&self, hex: &str) -> Option<bool> {
        let hex = hex.trim().to_ascii_uppercase();
        if hex.is_empty() {
            return None;
        }

        let mut entries = self.entries.lock().await;
        let now = epoch_seconds();
        if let Some(entry) = entries.get(&hex) {
            if now - entry.ts < self.ttl.as_secs_f64() {
                metrics::counter!("milcache.hit").increment(1);
                return entry.mil;
            }
        }

        metrics::counter!("milcache.miss").increment(1);
        let mil = match self.fetch_status(&hex).await {
            Ok(mil) => mil,
            Err(err) => {
                // Cache the failure as unknown so the next cycles do not
                // hammer a broken endpoint until the TTL expires.
                warn!("mil lookup for {hex} failed: {err:#}");
                None
            }
        };
        entries.insert(hex.clone(), MilCacheEntry { mil, ts: now });
        if let Err(err) = persist(&self.path, &entries) {
            warn!("failed to persist mil cache: {err:#}");
        }
        mil
    }

    async fn fetch_status(&self, hex: &str) -> Result<Option<bool>> {
        let url = format!("{}/v2/hex/{hex}", self.api_base);
        let response = self
            .client
            .get(&url)
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !response.status().is_success() {
            anyhow::bail!("hex endpoint returned {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("hex endpoint returned unparseable JSON")?;
        Ok(parse_mil_flag(&body))
    }

    /// Number of cached entries, fresh or stale.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Extract the military flag from a hex-endpoint payload: a top-level
/// boolean `mil`, or bit 0 of the first aircraft's `dbFlags`.
fn parse_mil_flag(body: &serde_json::Value) -> Option<bool> {
    if let Some(mil) = body.get("mil").and_then(serde_json::Value::as_bool) {
        return Some(mil);
    }
    body.get("ac")
        .and_then(serde_json::Value::as_array)
        .and_then(|ac| ac.first())
        .and_then(|first| first.get("dbFlags"))
        .and_then(serde_json::Value::as_i64)
        .map(|flags| flags & 1 == 1)
}

/// Write the whole map atomically: temp file in the same directory, then
/// rename over the target so readers never observe a truncated file.
fn persist(path: &Path, entries: &HashMap<String, MilCacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let contents = serde_json::to_vec_pretty(entries).context("failed to serialize mil cache")?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
