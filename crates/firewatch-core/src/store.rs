use crate::model::{ChangeEvent, Incident};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Mutation notification delivered synchronously to registered observers
#[derive(Debug, Clone)]
pub enum StoreMutation {
    Upserted(Incident),
    Removed(String),
}

/// Canonical in-memory collection of incident records for the process.
///
/// Keyed by `id`, with a BTreeMap ordering index on `(created_at, id)` so the
/// default presentation order (`created_at` descending, ties broken by `id`)
/// falls out of reverse iteration. Mutations are last-applied-wins; causal
/// ordering between conflicting writes is the caller's concern (the feed
/// adapter and mutation coordinator apply the "remote wins once observed"
/// rule above this layer).
pub struct IncidentStore {
    records: HashMap<String, Incident>,
    order: BTreeMap<(DateTime<Utc>, String), String>,
    observers: Vec<Box<dyn Fn(&StoreMutation) + Send + Sync>>,
    version: u64,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            order: BTreeMap::new(),
            observers: Vec::new(),
            version: 0,
        }
    }

    /// Register a callback invoked synchronously after every mutation,
    /// before the mutating call returns. Observers must not re-enter the
    /// store.
    pub fn on_mutation<F>(&mut self, callback: F)
    where
        F: Fn(&StoreMutation) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    /// Insert or fully replace the record with the given `id`. Idempotent:
    /// applying the same record twice yields the same state.
    pub fn upsert(&mut self, record: Incident) {
        if let Some(prev) = self.records.get(&record.id) {
            // created_at is immutable upstream, but the remote row image is
            // authoritative if it ever disagrees
            if prev.created_at != record.created_at {
                self.order.remove(&(prev.created_at, prev.id.clone()));
            }
        }
        self.order
            .insert((record.created_at, record.id.clone()), record.id.clone());
        self.records.insert(record.id.clone(), record.clone());
        self.notify(StoreMutation::Upserted(record));
    }

    /// Delete the record if present; no-op if absent. No tombstones.
    pub fn remove(&mut self, id: &str) {
        if let Some(prev) = self.records.remove(id) {
            self.order.remove(&(prev.created_at, prev.id.clone()));
            self.notify(StoreMutation::Removed(prev.id));
        }
    }

    /// Apply a normalized change-feed event. Insert and update are both a
    /// full-row upsert since the feed delivers full row images.
    pub fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(record) | ChangeEvent::Update(record) => self.upsert(record),
            ChangeEvent::Delete { id } => self.remove(&id),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.records.get(id)
    }

    /// Ordered snapshot, `created_at` descending
    pub fn all(&self) -> Vec<Incident> {
        self.order
            .values()
            .rev()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Monotonic counter advanced on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    fn notify(&mut self, mutation: StoreMutation) {
        self.version += 1;
        debug!(version = self.version, ?mutation, "store mutation");
        for observer in &self.observers {
            observer(&mutation);
        }
    }
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}
