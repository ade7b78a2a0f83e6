//! Adapter - The seam between the store and the backing resource.
//!
//! The store consults the adapter only when data is not already resident,
//! and routes every create/read/update/delete through this trait. Retry
//! and timeout policy belong to the adapter, not the core.

mod in_memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::Model;
use crate::record::Record;
use crate::relation::State;

pub use in_memory::InMemoryAdapter;

/// Failure reported by an adapter operation. The store wraps it with the
/// operation and model before surfacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        AdapterError {
            message: message.into(),
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AdapterError {}

/// Performs create/read/update/delete against the backing resource.
///
/// `create` and `update` return the canonical state of the entity,
/// including any server-assigned id; the store merges it back into the
/// record. `delete` is never called for a record the resource has not
/// seen.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Persist a new entity.
    async fn create(&self, record: &Record) -> Result<State, AdapterError>;

    /// Read one entity by id. Fails when not found.
    async fn read_one(&self, model: &Model, id: &Value) -> Result<State, AdapterError>;

    /// Read the full collection for a model.
    async fn read_all(&self, model: &Model) -> Result<Vec<State>, AdapterError>;

    /// Persist changes to an already-identified entity.
    async fn update(&self, record: &Record) -> Result<State, AdapterError>;

    /// Remove a persisted entity.
    async fn delete(&self, record: &Record) -> Result<(), AdapterError>;
}

/// Adapters are often shared between the store and the host (e.g. for
/// seeding); delegate through `Arc`.
#[async_trait]
impl<A: Adapter + ?Sized> Adapter for std::sync::Arc<A> {
    async fn create(&self, record: &Record) -> Result<State, AdapterError> {
        (**self).create(record).await
    }

    async fn read_one(&self, model: &Model, id: &Value) -> Result<State, AdapterError> {
        (**self).read_one(model, id).await
    }

    async fn read_all(&self, model: &Model) -> Result<Vec<State>, AdapterError> {
        (**self).read_all(model).await
    }

    async fn update(&self, record: &Record) -> Result<State, AdapterError> {
        (**self).update(record).await
    }

    async fn delete(&self, record: &Record) -> Result<(), AdapterError> {
        (**self).delete(record).await
    }
}
