use crate::client::FeedSignal;
use crate::remote::RemoteBackend;
use crate::SharedStore;
use firewatch_core::{ChangeEvent, SyncError};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

const MAX_BOOTSTRAP_ATTEMPTS: u32 = 3;
const BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Consumer-visible state of the sync pipeline. The store is not
/// trustworthy until the first bootstrap completes (`Live`); `Degraded`
/// means resubscription or resync is repeatedly failing and reads may be
/// stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Loading,
    Live,
    Degraded,
}

/// Drives the store from feed signals: bootstraps a consistent snapshot on
/// every (re)connect, then applies incremental change events.
///
/// Redelivered or reordered events are safe to apply directly because store
/// upserts are idempotent full-row replacements and the feed's row image is
/// authoritative over any optimistic local state.
pub struct FeedAdapter {
    store: SharedStore,
    backend: Arc<dyn RemoteBackend>,
    status: watch::Sender<FeedStatus>,
}

impl FeedAdapter {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn RemoteBackend>,
    ) -> (Self, watch::Receiver<FeedStatus>) {
        let (status, status_rx) = watch::channel(FeedStatus::Loading);
        (
            Self {
                store,
                backend,
                status,
            },
            status_rx,
        )
    }

    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<FeedSignal>) {
        while let Some(signal) = rx.recv().await {
            match signal {
                FeedSignal::Connected => {
                    info!("feed connected, bootstrapping");
                    self.bootstrap().await;
                }
                FeedSignal::Disconnected => {
                    warn!("feed disconnected");
                    let _ = self.status.send(FeedStatus::Loading);
                }
                FeedSignal::Change(event) => {
                    record_change(&event);
                    let mut store = self.store.write().await;
                    store.apply(event);
                    record_store_size(store.len());
                }
            }
        }
        info!("feed adapter stopped");
    }

    /// Full refetch closing any gap left by the push channel. Runs on every
    /// connect since the channel has no replay guarantee. The snapshot is
    /// authoritative in both directions: rows it carries are upserted and
    /// rows it no longer carries (deleted while disconnected) are removed.
    async fn bootstrap(&self) {
        for attempt in 1..=MAX_BOOTSTRAP_ATTEMPTS {
            match self.backend.fetch_all().await {
                Ok(records) => {
                    let count = records.len();
                    let fetched: HashSet<String> =
                        records.iter().map(|r| r.id.clone()).collect();
                    let mut store = self.store.write().await;
                    let stale: Vec<String> = store
                        .all()
                        .into_iter()
                        .filter(|r| !fetched.contains(&r.id))
                        .map(|r| r.id)
                        .collect();
                    for record in records {
                        store.upsert(record);
                    }
                    for id in &stale {
                        store.remove(id);
                    }
                    record_store_size(store.len());
                    drop(store);
                    info!(
                        "bootstrap complete, {} incidents, {} stale removed",
                        count,
                        stale.len()
                    );
                    let _ = self.status.send(FeedStatus::Live);
                    return;
                }
                Err(e) => {
                    warn!(
                        "bootstrap attempt {}/{} failed: {}",
                        attempt, MAX_BOOTSTRAP_ATTEMPTS, e
                    );
                    if attempt < MAX_BOOTSTRAP_ATTEMPTS {
                        sleep(BOOTSTRAP_RETRY_DELAY).await;
                    }
                }
            }
        }
        let err = SyncError::FeedDisruption(format!(
            "bootstrap failed after {} attempts",
            MAX_BOOTSTRAP_ATTEMPTS
        ));
        error!("{}", err);
        let _ = self.status.send(FeedStatus::Degraded);
    }
}

fn record_change(event: &ChangeEvent) {
    let kind = match event {
        ChangeEvent::Insert(_) => "insert",
        ChangeEvent::Update(_) => "update",
        ChangeEvent::Delete { .. } => "delete",
    };
    counter!("feed_events_total", "kind" => kind).increment(1);
}

fn record_store_size(len: usize) {
    gauge!("incident_store_size").set(len as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use firewatch_core::{
        ChangeEvent, Incident, IncidentDraft, IncidentPatch, IncidentStatus, IncidentStore,
        RiskLevel,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    fn incident(id: &str) -> Incident {
        let now = Utc::now();
        Incident {
            id: id.to_string(),
            latitude: -33.45,
            longitude: -70.65,
            description: "Large fire near forest area spotted".to_string(),
            risk_level: RiskLevel::High,
            status: IncidentStatus::Pending,
            assistance_type: None,
            dispatched_resources: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    struct StubBackend {
        records: Vec<Incident>,
        fail_fetches: bool,
        fetch_calls: AtomicU32,
    }

    impl StubBackend {
        fn with_records(records: Vec<Incident>) -> Self {
            Self {
                records,
                fail_fetches: false,
                fetch_calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                records: Vec::new(),
                fail_fetches: true,
                fetch_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteBackend for StubBackend {
        async fn fetch_all(&self) -> anyhow::Result<Vec<Incident>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetches {
                anyhow::bail!("backend unavailable");
            }
            Ok(self.records.clone())
        }

        async fn insert_incident(&self, _draft: &IncidentDraft) -> anyhow::Result<Incident> {
            unreachable!("adapter never inserts");
        }

        async fn update_incident(&self, _id: &str, _patch: &IncidentPatch) -> anyhow::Result<()> {
            unreachable!("adapter never updates");
        }

        async fn delete_incident(&self, _id: &str) -> anyhow::Result<()> {
            unreachable!("adapter never deletes");
        }
    }

    fn shared_store() -> SharedStore {
        Arc::new(RwLock::new(IncidentStore::new()))
    }

    #[tokio::test]
    async fn test_bootstrap_on_connect() {
        let store = shared_store();
        let backend = Arc::new(StubBackend::with_records(vec![
            incident("a"),
            incident("b"),
        ]));
        let (adapter, status) = FeedAdapter::new(store.clone(), backend);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Connected).unwrap();
        drop(tx);
        adapter.run(rx).await;

        assert_eq!(store.read().await.len(), 2);
        assert_eq!(*status.borrow(), FeedStatus::Live);
    }

    #[tokio::test]
    async fn test_bootstrap_removes_records_missing_from_snapshot() {
        let store = shared_store();
        // "gone" was deleted server-side while the feed was down; only
        // "kept" comes back in the resync snapshot.
        store.write().await.upsert(incident("kept"));
        store.write().await.upsert(incident("gone"));

        let backend = Arc::new(StubBackend::with_records(vec![incident("kept")]));
        let (adapter, status) = FeedAdapter::new(store.clone(), backend);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Disconnected).unwrap();
        tx.send(FeedSignal::Connected).unwrap();
        drop(tx);
        adapter.run(rx).await;

        let guard = store.read().await;
        assert!(guard.get("kept").is_some());
        assert!(guard.get("gone").is_none());
        assert_eq!(guard.len(), 1);
        assert_eq!(*status.borrow(), FeedStatus::Live);
    }

    #[test]
    fn test_change_and_size_metrics_render() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_change(&ChangeEvent::Delete {
                id: "x".to_string(),
            });
            record_store_size(7);
        });
        let rendered = handle.render();
        assert!(rendered.contains("feed_events_total"));
        assert!(rendered.contains("incident_store_size"));
    }

    #[tokio::test]
    async fn test_redelivered_events_are_noops() {
        let store = shared_store();
        let backend = Arc::new(StubBackend::with_records(Vec::new()));
        let (adapter, _status) = FeedAdapter::new(store.clone(), backend);

        let rec = incident("dup");
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Connected).unwrap();
        tx.send(FeedSignal::Change(ChangeEvent::Insert(rec.clone())))
            .unwrap();
        tx.send(FeedSignal::Change(ChangeEvent::Insert(rec))).unwrap();
        drop(tx);
        adapter.run(rx).await;

        assert_eq!(store.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_event_overwrites_optimistic_state() {
        let store = shared_store();

        // Optimistic local write says resolved
        let mut optimistic = incident("contested");
        optimistic.status = IncidentStatus::Resolved;
        store.write().await.upsert(optimistic.clone());

        // The feed's row image says pending; it wins
        let mut authoritative = optimistic.clone();
        authoritative.status = IncidentStatus::Pending;
        authoritative.updated_at = Utc::now();

        let backend = Arc::new(StubBackend::with_records(Vec::new()));
        let (adapter, _status) = FeedAdapter::new(store.clone(), backend);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Change(ChangeEvent::Update(authoritative)))
            .unwrap();
        drop(tx);
        adapter.run(rx).await;

        let guard = store.read().await;
        assert_eq!(guard.get("contested").unwrap().status, IncidentStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_after_repeated_bootstrap_failures() {
        let store = shared_store();
        let backend = Arc::new(StubBackend::failing());
        let (adapter, status) = FeedAdapter::new(store.clone(), backend.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Connected).unwrap();
        drop(tx);
        adapter.run(rx).await;

        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 3);
        assert_eq!(*status.borrow(), FeedStatus::Degraded);
    }

    #[tokio::test]
    async fn test_disconnect_marks_store_loading() {
        let store = shared_store();
        let backend = Arc::new(StubBackend::with_records(Vec::new()));
        let (adapter, status) = FeedAdapter::new(store.clone(), backend);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(FeedSignal::Connected).unwrap();
        tx.send(FeedSignal::Disconnected).unwrap();
        drop(tx);
        adapter.run(rx).await;

        assert_eq!(*status.borrow(), FeedStatus::Loading);
    }
}
