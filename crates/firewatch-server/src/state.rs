use crate::coordinator::MutationCoordinator;
use chrono::{DateTime, Utc};
use firewatch_feed::{FeedStatus, SharedStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Process-wide context: the canonical store handle, the session anchor,
/// and the feed pipeline status. Explicitly constructed (never ambient) so
/// tests can build a fresh one per case.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub coordinator: Arc<MutationCoordinator>,
    pub metrics: PrometheusHandle,
    /// Captured once at construction; drives the "since session start" view
    pub session_start: DateTime<Utc>,
    feed_status: watch::Receiver<FeedStatus>,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        coordinator: Arc<MutationCoordinator>,
        feed_status: watch::Receiver<FeedStatus>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            store,
            coordinator,
            metrics,
            session_start: Utc::now(),
            feed_status,
            start_time: Instant::now(),
        }
    }

    pub fn feed_status(&self) -> FeedStatus {
        *self.feed_status.borrow()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
