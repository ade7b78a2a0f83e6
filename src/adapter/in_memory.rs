//! InMemoryAdapter - HashMap-backed adapter for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Adapter, AdapterError};
use crate::model::Model;
use crate::record::Record;
use crate::relation::State;

/// In-memory backing resource keyed by model url, with sequential
/// server-assigned ids.
///
/// Per-operation call counters let tests assert the store's cache-first
/// and coalescing behavior: a no-op save, an unsaved destroy, or a second
/// `all()` must leave the counters untouched.
#[derive(Default)]
pub struct InMemoryAdapter {
    collections: RwLock<HashMap<String, Vec<State>>>,
    next_id: AtomicU64,
    creates: AtomicU64,
    reads: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        InMemoryAdapter {
            next_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Seed a collection with rows (JSON objects). Seeded numeric ids bump
    /// the id sequence so created entities never collide with them.
    pub fn seed(&self, url: &str, rows: Vec<Value>) {
        let mut collections = self.collections.write();
        let collection = collections.entry(url.to_string()).or_default();
        for row in rows {
            if let Value::Object(state) = row {
                if let Some(id) = state.get("id").and_then(Value::as_u64) {
                    let mut next = self.next_id.load(Ordering::Relaxed);
                    while next <= id {
                        match self.next_id.compare_exchange(
                            next,
                            id + 1,
                            Ordering::Relaxed,
                            Ordering::Relaxed,
                        ) {
                            Ok(_) => break,
                            Err(actual) => next = actual,
                        }
                    }
                }
                collection.push(state);
            }
        }
    }

    /// Rows currently stored under `url`.
    pub fn rows(&self, url: &str) -> Vec<State> {
        self.collections
            .read()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    pub fn create_calls(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    pub fn read_calls(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn update_calls(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    fn state_of(record: &Record) -> State {
        match record.to_json() {
            Value::Object(state) => state,
            _ => State::new(),
        }
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    async fn create(&self, record: &Record) -> Result<State, AdapterError> {
        self.creates.fetch_add(1, Ordering::Relaxed);
        let mut state = Self::state_of(record);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.insert("id".into(), Value::from(id));
        self.collections
            .write()
            .entry(record.model().url.clone())
            .or_default()
            .push(state.clone());
        Ok(state)
    }

    async fn read_one(&self, model: &Model, id: &Value) -> Result<State, AdapterError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.collections
            .read()
            .get(&model.url)
            .and_then(|rows| rows.iter().find(|row| row.get("id") == Some(id)))
            .cloned()
            .ok_or_else(|| AdapterError::new(format!("{} {} not found", model.name, id)))
    }

    async fn read_all(&self, model: &Model) -> Result<Vec<State>, AdapterError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows(&model.url))
    }

    async fn update(&self, record: &Record) -> Result<State, AdapterError> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        let state = Self::state_of(record);
        let id = state
            .get("id")
            .cloned()
            .ok_or_else(|| AdapterError::new("update requires an id"))?;
        let mut collections = self.collections.write();
        let rows = collections
            .get_mut(&record.model().url)
            .ok_or_else(|| AdapterError::new(format!("no collection for {}", record.model().name)))?;
        let row = rows
            .iter_mut()
            .find(|row| row.get("id") == Some(&id))
            .ok_or_else(|| {
                AdapterError::new(format!("{} {} not found", record.model().name, id))
            })?;
        *row = state.clone();
        Ok(state)
    }

    async fn delete(&self, record: &Record) -> Result<(), AdapterError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let id = record
            .persisted_id()
            .ok_or_else(|| AdapterError::new("delete requires an id"))?;
        let mut collections = self.collections.write();
        let rows = collections
            .get_mut(&record.model().url)
            .ok_or_else(|| AdapterError::new(format!("no collection for {}", record.model().name)))?;
        let before = rows.len();
        rows.retain(|row| row.get("id") != Some(&id));
        if rows.len() == before {
            return Err(AdapterError::new(format!(
                "{} {} not found",
                record.model().name,
                id
            )));
        }
        Ok(())
    }
}
