use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{services::sse_events, state::SharedState};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const GOOD_BELOW: Duration = Duration::from_millis(100);
const FAIR_BELOW: Duration = Duration::from_millis(300);

/// Coarse link quality shown next to the room code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    Good,
    Fair,
    Poor,
}

/// Result of one datastore probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct NetworkReport {
    pub quality: NetworkQuality,
    /// Round trip of the probe, absent when it failed.
    pub latency_ms: Option<u64>,
}

/// Map a probe latency to a quality; a failed probe is poor.
pub fn classify(latency: Option<Duration>) -> NetworkQuality {
    match latency {
        Some(latency) if latency < GOOD_BELOW => NetworkQuality::Good,
        Some(latency) if latency < FAIR_BELOW => NetworkQuality::Fair,
        _ => NetworkQuality::Poor,
    }
}

/// Probe the datastore forever, toggling degraded mode on failures.
pub async fn run(state: SharedState) {
    loop {
        probe(&state).await;
        sleep(PROBE_INTERVAL).await;
    }
}

/// Run a single health check and publish its outcome.
pub async fn probe(state: &SharedState) -> NetworkReport {
    let started = Instant::now();
    let outcome = timeout(PROBE_TIMEOUT, state.store().health_check()).await;
    let latency = match outcome {
        Ok(Ok(())) => Some(started.elapsed()),
        Ok(Err(err)) => {
            warn!(error = %err, "datastore health check failed");
            None
        }
        Err(_) => {
            warn!(timeout = ?PROBE_TIMEOUT, "datastore health check timed out");
            None
        }
    };

    let report = NetworkReport {
        quality: classify(latency),
        latency_ms: latency.map(|elapsed| elapsed.as_millis() as u64),
    };

    let previous = state.network().await;
    state.set_network(report).await;
    if previous.map(|p| p.quality) != Some(report.quality) {
        sse_events::broadcast_network(state, report);
    }

    let degraded = latency.is_none();
    if state.update_degraded(degraded) {
        if degraded {
            warn!("datastore unreachable; entering degraded mode");
        } else {
            info!("datastore reachable again; leaving degraded mode");
        }
        sse_events::broadcast_system_status(state, degraded);
        sse_events::broadcast_view(state).await;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_thresholds() {
        assert_eq!(classify(Some(Duration::from_millis(20))), NetworkQuality::Good);
        assert_eq!(classify(Some(Duration::from_millis(100))), NetworkQuality::Fair);
        assert_eq!(classify(Some(Duration::from_millis(299))), NetworkQuality::Fair);
        assert_eq!(classify(Some(Duration::from_millis(300))), NetworkQuality::Poor);
        assert_eq!(classify(None), NetworkQuality::Poor);
    }
}
