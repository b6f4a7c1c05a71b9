//! In-process backend
//!
//! Holds every collection in memory, assigns ids and `created_at`, and
//! broadcasts a [`ChangeEvent`] after each successful mutation, the same
//! way the hosted backend echoes writes on its change feed. Used as the
//! offline backend and as the test double.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use shared::message::ChangeEvent;
use shared::models::Collection;
use shared::query::{Filter, Query, matches_all};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::RemoteStore;
use crate::{ClientError, ClientResult};

/// Store operation, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

pub struct MemoryStore {
    tables: Mutex<HashMap<Collection, Vec<Value>>>,
    events: broadcast::Sender<ChangeEvent>,
    failures: Mutex<HashSet<(Collection, StoreOp)>>,
    calls: AtomicUsize,
    /// Last issued `created_at`, microseconds
    clock: AtomicI64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("calls", &self.calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            tables: Mutex::new(HashMap::new()),
            events,
            failures: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            clock: AtomicI64::new(0),
        }
    }

    /// Change feed sender (hand to a `MemoryTransport`)
    pub fn change_sender(&self) -> broadcast::Sender<ChangeEvent> {
        self.events.clone()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Load rows as-is, without events or call accounting
    pub fn seed(&self, collection: Collection, rows: Vec<Value>) {
        self.tables.lock().entry(collection).or_default().extend(rows);
    }

    /// Snapshot of a collection
    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.tables
            .lock()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `op` on `collection` fail with a remote error
    pub fn fail_next(&self, collection: Collection, op: StoreOp) {
        self.failures.lock().insert((collection, op));
    }

    /// Number of store calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, collection: Collection, op: StoreOp) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.lock().remove(&(collection, op)) {
            tracing::debug!(collection = %collection, ?op, "Injected failure");
            return Err(ClientError::Remote {
                status: 503,
                message: format!("injected {:?} failure on {}", op, collection),
            });
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::trace!("No change feed subscribers: {}", e);
        }
    }

    /// Strictly increasing RFC 3339 timestamp
    fn next_created_at(&self) -> String {
        let now = chrono::Utc::now().timestamp_micros();
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .clock
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    return chrono::DateTime::<chrono::Utc>::from_timestamp_micros(next)
                        .unwrap_or_default()
                        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
                }
                Err(current) => last = current,
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, query: &Query) -> ClientResult<Vec<Value>> {
        self.enter(query.collection, StoreOp::Select)?;
        let tables = self.tables.lock();
        Ok(tables
            .get(&query.collection)
            .map(|rows| query.apply(rows.iter()))
            .unwrap_or_default())
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> ClientResult<Vec<Value>> {
        self.enter(collection, StoreOp::Insert)?;
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut fields) = row else {
                return Err(ClientError::Remote {
                    status: 400,
                    message: format!("insert into {} expects objects", collection),
                });
            };
            fields
                .entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            if !fields.contains_key("created_at") {
                fields.insert("created_at".into(), Value::String(self.next_created_at()));
            }
            stored.push(Value::Object(fields));
        }

        self.tables
            .lock()
            .entry(collection)
            .or_default()
            .extend(stored.iter().cloned());
        for row in &stored {
            self.publish(ChangeEvent::insert(collection, row.clone()));
        }
        Ok(stored)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> ClientResult<()> {
        self.enter(collection, StoreOp::Update)?;
        let Value::Object(patch) = patch else {
            return Err(ClientError::Remote {
                status: 400,
                message: "patch must be an object".into(),
            });
        };

        let event = {
            let mut tables = self.tables.lock();
            let row = tables
                .get_mut(&collection)
                .and_then(|rows| rows.iter_mut().find(|r| r.get("id") == Some(&Value::from(id))))
                .ok_or_else(|| ClientError::NotFound(format!("{} {}", collection, id)))?;
            let old = row.clone();
            if let Value::Object(fields) = row {
                merge(fields, patch);
            }
            ChangeEvent::update(collection, row.clone(), Some(old))
        };
        self.publish(event);
        Ok(())
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> ClientResult<()> {
        self.enter(collection, StoreOp::Delete)?;
        let removed: Vec<Value> = {
            let mut tables = self.tables.lock();
            let Some(rows) = tables.get_mut(&collection) else {
                return Ok(());
            };
            let (removed, kept) = std::mem::take(rows)
                .into_iter()
                .partition(|row| matches_all(filters, row));
            *rows = kept;
            removed
        };
        for row in removed {
            self.publish(ChangeEvent::delete(collection, row));
        }
        Ok(())
    }
}

fn merge(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}
