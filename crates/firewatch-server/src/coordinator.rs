use chrono::Utc;
use firewatch_core::{
    AssistanceType, Incident, IncidentDraft, IncidentPatch, IncidentStatus, SyncError,
};
use firewatch_feed::{RemoteBackend, SharedStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies operator actions optimistically: the store is mutated first so
/// the UI reflects the change immediately, then the remote write is issued.
/// A failed remote write rolls the store back and surfaces a typed error,
/// so the store never silently diverges from what the operator was told.
///
/// Race rule: a feed event observed while a write is in flight is
/// authoritative. Rollback therefore only restores the pre-write snapshot
/// if the record is still exactly the optimistic image; any other image
/// (even one carrying the same `updated_at`) superseded it and is kept.
pub struct MutationCoordinator {
    store: SharedStore,
    backend: Arc<dyn RemoteBackend>,
}

impl MutationCoordinator {
    pub fn new(store: SharedStore, backend: Arc<dyn RemoteBackend>) -> Self {
        Self { store, backend }
    }

    pub async fn create_incident(&self, draft: IncidentDraft) -> Result<Incident, SyncError> {
        // Rejected before any store or remote touch
        draft.validate()?;

        let created = self
            .backend
            .insert_incident(&draft)
            .await
            .map_err(|e| SyncError::RemoteWrite(e.to_string()))?;
        crate::metrics::record_mutation("create");

        // The feed may deliver this row (and follow-up edits) before the
        // insert response lands; only apply the response if the store does
        // not already hold a newer image
        let mut store = self.store.write().await;
        let superseded = store
            .get(&created.id)
            .is_some_and(|current| current.updated_at > created.updated_at);
        if superseded {
            debug!("feed already delivered a newer image of {}", created.id);
        } else {
            store.upsert(created.clone());
        }
        Ok(created)
    }

    pub async fn change_status(
        &self,
        id: &str,
        status: IncidentStatus,
    ) -> Result<Incident, SyncError> {
        let (prev, optimistic) = self
            .apply_optimistic(id, |rec| rec.status = status)
            .await?;
        crate::metrics::record_mutation("change_status");

        let patch = IncidentPatch::status(status, optimistic.updated_at);
        match self.backend.update_incident(id, &patch).await {
            Ok(()) => Ok(optimistic),
            Err(e) => {
                self.rollback("change_status", prev, &optimistic).await;
                Err(SyncError::RemoteWrite(e.to_string()))
            }
        }
    }

    pub async fn change_assistance_type(
        &self,
        id: &str,
        kind: Option<AssistanceType>,
    ) -> Result<Incident, SyncError> {
        let (prev, optimistic) = self
            .apply_optimistic(id, |rec| rec.assistance_type = kind)
            .await?;
        crate::metrics::record_mutation("change_assistance");

        let patch = IncidentPatch::assistance(kind, optimistic.updated_at);
        match self.backend.update_incident(id, &patch).await {
            Ok(()) => Ok(optimistic),
            Err(e) => {
                self.rollback("change_assistance", prev, &optimistic).await;
                Err(SyncError::RemoteWrite(e.to_string()))
            }
        }
    }

    /// Replaces the full dispatched set; the remote contract is
    /// replace-on-write, never an incremental merge.
    pub async fn dispatch_resources(
        &self,
        id: &str,
        resources: Vec<String>,
    ) -> Result<Incident, SyncError> {
        let (prev, optimistic) = self
            .apply_optimistic(id, |rec| rec.dispatched_resources = resources.clone())
            .await?;
        crate::metrics::record_mutation("dispatch");

        let patch = IncidentPatch::resources(resources, optimistic.updated_at);
        match self.backend.update_incident(id, &patch).await {
            Ok(()) => Ok(optimistic),
            Err(e) => {
                self.rollback("dispatch", prev, &optimistic).await;
                Err(SyncError::RemoteWrite(e.to_string()))
            }
        }
    }

    pub async fn delete_incident(&self, id: &str) -> Result<(), SyncError> {
        let prev = {
            let mut store = self.store.write().await;
            let prev = store
                .get(id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            store.remove(id);
            prev
        };
        crate::metrics::record_mutation("delete");

        match self.backend.delete_incident(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut store = self.store.write().await;
                // Re-insert unless a feed event already produced a row for
                // this id (remote wins once observed)
                if store.get(id).is_none() {
                    warn!("remote delete of {} failed, restoring record", id);
                    store.upsert(prev);
                }
                crate::metrics::record_rollback("delete");
                Err(SyncError::RemoteWrite(e.to_string()))
            }
        }
    }

    async fn apply_optimistic<F>(
        &self,
        id: &str,
        mutate: F,
    ) -> Result<(Incident, Incident), SyncError>
    where
        F: FnOnce(&mut Incident),
    {
        let mut store = self.store.write().await;
        let prev = store
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let mut next = prev.clone();
        mutate(&mut next);
        next.updated_at = Utc::now();
        store.upsert(next.clone());
        Ok((prev, next))
    }

    async fn rollback(&self, op: &str, prev: Incident, optimistic: &Incident) {
        let mut store = self.store.write().await;
        match store.get(&prev.id) {
            Some(current) if current == optimistic => {
                warn!("remote write failed, rolling back {} on {}", op, prev.id);
                store.upsert(prev);
            }
            _ => {
                debug!("skipping {} rollback for {}, feed superseded it", op, prev.id);
            }
        }
        crate::metrics::record_rollback(op);
    }
}
