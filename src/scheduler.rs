use std::time::{Duration, Instant};

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;

/// Supervisory loop: one cycle at a time, jittered interval, clean
/// shutdown on cancellation.
///
/// The jitter keeps a fleet of trackers from hitting the providers in
/// lockstep. A cycle that overruns its interval triggers the next one
/// immediately.
pub async fn run_loop(pipeline: &mut Pipeline, cancel: CancellationToken) {
    let min = pipeline.config().fetch_interval_min;
    let max = pipeline.config().fetch_interval_max;
    info!(
        "scheduler started, cycle interval {}-{}s",
        min.as_secs(),
        max.as_secs()
    );

    while !cancel.is_cancelled() {
        let interval = {
            let mut rng = rand::rng();
            Duration::from_secs(rng.random_range(min.as_secs()..=max.as_secs()))
        };

        let started = Instant::now();
        if let Err(err) = pipeline.run_cycle(&cancel).await {
            error!("cycle failed: {err:#}");
            pipeline.record_error();
        }
        if cancel.is_cancelled() {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed >= interval {
            warn!(
                "cycle took {:.1}s, longer than the {}s interval; starting next cycle immediately",
                elapsed.as_secs_f64(),
                interval.as_secs()
            );
            continue;
        }

        let sleep = interval - elapsed;
        debug!("sleeping {:.1}s until next cycle", sleep.as_secs_f64());
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = cancel.cancelled() => break,
        }
    }

    info!("scheduler stopping");
    pipeline.shutdown().await;
}
