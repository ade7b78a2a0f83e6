//! Store - Model registry, identity-mapped cache, relation resolver, and
//! save/destroy orchestrator.
//!
//! The store guarantees at most one [`Record`] instance per model +
//! identity: `get`, `all`, and relation resolution reuse resident
//! instances and coalesce overlapping fetches for the same key into a
//! single in-flight adapter read. The adapter is consulted only when data
//! is not already resident.
//!
//! ## Example
//!
//! ```ignore
//! use record_store::{attr, belongs_to, has_many, schema, InMemoryAdapter, Store};
//!
//! let store = Store::new(InMemoryAdapter::new());
//! store.register_model("zoo", "/zoos/", schema([
//!     ("id", attr()),
//!     ("city", attr()),
//!     ("cats", has_many("cat")),
//! ]))?;
//! store.register_model("cat", "/cats/", schema([
//!     ("id", attr()),
//!     ("name", attr()),
//!     ("zoo", belongs_to("zoo")),
//! ]))?;
//!
//! let zoo = store.get("zoo", 1).await?;
//! let cats = zoo.get("cats").await?.many();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::adapter::Adapter;
use crate::error::StoreError;
use crate::model::Model;
use crate::record::Record;
use crate::relation::{Schema, State};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, StoreError>>>;

#[derive(Default)]
struct ModelCache {
    records: Vec<Record>,
    /// Set once a full collection fetch has completed; `all` short-circuits
    /// to the cache afterwards.
    fetched_all: bool,
}

impl ModelCache {
    /// Linear scan by identity: id match first, cid match as fallback.
    fn find(&self, identity: &Value) -> Option<Record> {
        if let Some(record) = self
            .records
            .iter()
            .find(|record| record.persisted_id().as_ref() == Some(identity))
        {
            return Some(record.clone());
        }
        self.records
            .iter()
            .find(|record| matches!(identity, Value::String(s) if s == record.cid()))
            .cloned()
    }
}

pub(crate) struct StoreInner {
    adapter: Arc<dyn Adapter>,
    models: RwLock<HashMap<String, Arc<Model>>>,
    caches: RwLock<HashMap<String, ModelCache>>,
    inflight_one: Mutex<HashMap<(String, String), SharedFetch<Record>>>,
    inflight_all: Mutex<HashMap<String, SharedFetch<Vec<Record>>>>,
}

/// Registry of models and identity-mapped cache of records, clone-friendly
/// via `Arc`. See the module docs for an example.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(adapter: impl Adapter + 'static) -> Store {
        Store {
            inner: Arc::new(StoreInner {
                adapter: Arc::new(adapter),
                models: RwLock::new(HashMap::new()),
                caches: RwLock::new(HashMap::new()),
                inflight_one: Mutex::new(HashMap::new()),
                inflight_all: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a model under a unique name with its resource url and
    /// schema; initializes an empty identity cache for it.
    pub fn register_model(&self, name: &str, url: &str, schema: Schema) -> Result<(), StoreError> {
        let model = Model::new(name, url, schema)?;
        let mut models = self.inner.models.write();
        if models.contains_key(name) {
            return Err(StoreError::DuplicateModel {
                model: name.to_string(),
            });
        }
        models.insert(name.to_string(), Arc::new(model));
        self.inner
            .caches
            .write()
            .insert(name.to_string(), ModelCache::default());
        tracing::debug!(model = name, url, "registered model");
        Ok(())
    }

    /// The registered model for `name`.
    pub fn model(&self, name: &str) -> Result<Arc<Model>, StoreError> {
        self.inner.model(name)
    }

    /// Build a record from the model's schema and cache it immediately, so
    /// it participates in `all()` and relation resolution before it is
    /// ever persisted.
    pub fn create_record(&self, model: &str, state: State) -> Result<Record, StoreError> {
        let record = self.create_record_uncached(model, state)?;
        self.cache(&record)?;
        Ok(record)
    }

    /// Build a record without caching it. The record joins the identity
    /// cache on first successful save, or via [`Store::cache`].
    pub fn create_record_uncached(&self, model: &str, state: State) -> Result<Record, StoreError> {
        let model = self.inner.model(model)?;
        let state = model.initial_state(state);
        Ok(Record::new(model, state, Arc::downgrade(&self.inner)))
    }

    /// Fetch one record by id, cache-first.
    ///
    /// A resident record (matched by id or cid) resolves without an
    /// adapter call. Concurrent misses for the same (model, id) share a
    /// single in-flight adapter read.
    pub async fn get(&self, model: &str, id: impl Into<Value>) -> Result<Record, StoreError> {
        let id = id.into();
        let model = self.inner.model(model)?;
        if id.is_null() {
            return Err(StoreError::MissingId {
                model: model.name.clone(),
            });
        }
        if let Some(hit) = self.inner.find_cached(&model.name, &id)? {
            return Ok(hit);
        }

        let key = (model.name.clone(), id.to_string());
        let fetch = {
            let mut inflight = self.inner.inflight_one.lock();
            match inflight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    tracing::debug!(model = %model.name, %id, "cache miss, fetching record");
                    let inner = Arc::clone(&self.inner);
                    let cleanup_key = key.clone();
                    let fetch = async move {
                        let result = Arc::clone(&inner).fetch_one(model, id).await;
                        inner.inflight_one.lock().remove(&cleanup_key);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Fetch the full collection for a model.
    ///
    /// After the first complete fetch the cached collection is returned
    /// without touching the adapter. Cache-resident records absent from
    /// the adapter's response (locally created, not yet persisted) remain
    /// part of the result. Concurrent first fetches are coalesced.
    pub async fn all(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        let model = self.inner.model(model)?;
        {
            let caches = self.inner.caches.read();
            if let Some(cache) = caches.get(&model.name) {
                if cache.fetched_all {
                    return Ok(cache.records.clone());
                }
            }
        }

        let key = model.name.clone();
        let fetch = {
            let mut inflight = self.inner.inflight_all.lock();
            match inflight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    tracing::debug!(model = %model.name, "fetching full collection");
                    let inner = Arc::clone(&self.inner);
                    let cleanup_key = key.clone();
                    let fetch = async move {
                        let result = Arc::clone(&inner).fetch_all(model).await;
                        inner.inflight_all.lock().remove(&cleanup_key);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// [`Store::all`] for several models at once.
    pub async fn all_many(&self, models: &[&str]) -> Result<Vec<Vec<Record>>, StoreError> {
        let mut collections = Vec::with_capacity(models.len());
        for model in models {
            collections.push(self.all(model).await?);
        }
        Ok(collections)
    }

    /// Reduce `all(model)` to exactly one record.
    pub async fn one(&self, model: &str) -> Result<Record, StoreError> {
        let mut records = self.all(model).await?;
        if records.len() == 1 {
            Ok(records.remove(0))
        } else {
            Err(StoreError::ResultCount {
                model: model.to_string(),
                found: records.len(),
            })
        }
    }

    /// Like [`Store::one`], but an empty collection produces a fresh
    /// record instead of an error.
    pub async fn always_one(&self, model: &str) -> Result<Record, StoreError> {
        let mut records = self.all(model).await?;
        match records.len() {
            0 => self.create_record(model, State::new()),
            1 => Ok(records.remove(0)),
            found => Err(StoreError::ResultCount {
                model: model.to_string(),
                found,
            }),
        }
    }

    /// Persist a record: adapter `update` when it already carries an id,
    /// adapter `create` otherwise. A successful create promotes the record
    /// into the identity cache. Returns the adapter's canonical state.
    pub async fn save_record(&self, record: &Record) -> Result<State, StoreError> {
        let model = record.model_name().to_string();
        if record.is_persisted() {
            tracing::debug!(model = %model, id = %record.identity(), "updating record");
            self.inner
                .adapter
                .update(record)
                .await
                .map_err(|e| StoreError::adapter("update", &model, e))
        } else {
            tracing::debug!(model = %model, cid = %record.cid(), "creating record");
            let canonical = self
                .inner
                .adapter
                .create(record)
                .await
                .map_err(|e| StoreError::adapter("create", &model, e))?;
            self.cache(record)?;
            Ok(canonical)
        }
    }

    /// Remove a record. Persisted records are deleted through the adapter
    /// and evicted from the cache only on success; never-persisted records
    /// are evicted immediately with no adapter call.
    pub async fn destroy_record(&self, record: &Record) -> Result<(), StoreError> {
        let model = record.model_name().to_string();
        if record.is_persisted() {
            tracing::debug!(model = %model, id = %record.identity(), "deleting record");
            self.inner
                .adapter
                .delete(record)
                .await
                .map_err(|e| StoreError::adapter("delete", &model, e))?;
        }
        let mut caches = self.inner.caches.write();
        let cache = caches
            .get_mut(&model)
            .ok_or(StoreError::UnknownModel { model })?;
        cache.records.retain(|resident| resident != record);
        Ok(())
    }

    /// Linear scan of the model's cache by identity: a record whose id
    /// equals `identity`, or whose cid equals it if no id matches.
    pub fn search_cache(&self, model: &str, identity: &Value) -> Result<Option<Record>, StoreError> {
        self.inner.find_cached(model, identity)
    }

    /// Add a record to the identity cache unless its identity is already
    /// resident. Never materializes a second instance for an identity.
    pub fn cache(&self, record: &Record) -> Result<(), StoreError> {
        let mut caches = self.inner.caches.write();
        let cache = caches
            .get_mut(record.model_name())
            .ok_or_else(|| StoreError::UnknownModel {
                model: record.model_name().to_string(),
            })?;
        if cache.find(&record.identity()).is_none() {
            cache.records.push(record.clone());
        }
        Ok(())
    }

    /// Whether a full collection fetch has completed for `model`.
    pub(crate) fn fetched_all(&self, model: &str) -> Result<bool, StoreError> {
        let caches = self.inner.caches.read();
        caches
            .get(model)
            .map(|cache| cache.fetched_all)
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// All cache-resident records of `model`, fetched or not.
    pub(crate) fn cached(&self, model: &str) -> Result<Vec<Record>, StoreError> {
        let caches = self.inner.caches.read();
        caches
            .get(model)
            .map(|cache| cache.records.clone())
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.to_string(),
            })
    }
}

impl StoreInner {
    fn model(&self, name: &str) -> Result<Arc<Model>, StoreError> {
        self.models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownModel {
                model: name.to_string(),
            })
    }

    fn find_cached(&self, model: &str, identity: &Value) -> Result<Option<Record>, StoreError> {
        let caches = self.caches.read();
        caches
            .get(model)
            .map(|cache| cache.find(identity))
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.to_string(),
            })
    }

    async fn fetch_one(self: Arc<Self>, model: Arc<Model>, id: Value) -> Result<Record, StoreError> {
        let data = self
            .adapter
            .read_one(&model, &id)
            .await
            .map_err(|e| StoreError::adapter("read", &model.name, e))?;
        let state = model.initial_state(data);

        let mut caches = self.caches.write();
        let cache = caches
            .get_mut(&model.name)
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.name.clone(),
            })?;
        // A record for this identity may have been cached while the read
        // was in flight; the resident instance wins.
        if let Some(existing) = cache.find(&id) {
            return Ok(existing);
        }
        let record = Record::from_fetched(Arc::clone(&model), state, Arc::downgrade(&self));
        cache.records.push(record.clone());
        Ok(record)
    }

    async fn fetch_all(self: Arc<Self>, model: Arc<Model>) -> Result<Vec<Record>, StoreError> {
        let items = self
            .adapter
            .read_all(&model)
            .await
            .map_err(|e| StoreError::adapter("read", &model.name, e))?;

        let mut caches = self.caches.write();
        let cache = caches
            .get_mut(&model.name)
            .ok_or_else(|| StoreError::UnknownModel {
                model: model.name.clone(),
            })?;
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let state = model.initial_state(item);
            let id = state.get("id").cloned().unwrap_or(Value::Null);
            let existing = if id.is_null() { None } else { cache.find(&id) };
            match existing {
                Some(record) => result.push(record),
                None => {
                    let record =
                        Record::from_fetched(Arc::clone(&model), state, Arc::downgrade(&self));
                    cache.records.push(record.clone());
                    result.push(record);
                }
            }
        }
        cache.fetched_all = true;
        // Locally created records the backing resource has never seen stay
        // visible to all() and therefore to hasMany resolution.
        for resident in &cache.records {
            if !result.contains(resident) {
                result.push(resident.clone());
            }
        }
        Ok(result)
    }
}
