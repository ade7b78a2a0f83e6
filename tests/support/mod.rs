#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use record_store::{
    attr, belongs_to, has_many, schema, Adapter, AdapterError, InMemoryAdapter, Model, Record,
    State, Store,
};
use serde_json::{json, Value};

/// Store with the zoo/cat models registered against a shared adapter.
pub fn zoo_store(adapter: Arc<InMemoryAdapter>) -> Store {
    let store = Store::new(adapter);
    register_zoo_models(&store);
    store
}

pub fn register_zoo_models(store: &Store) {
    store
        .register_model(
            "zoo",
            "/zoos/",
            schema([("id", attr()), ("city", attr()), ("cats", has_many("cat"))]),
        )
        .unwrap();
    store
        .register_model(
            "cat",
            "/cats/",
            schema([("id", attr()), ("name", attr()), ("zoo", belongs_to("zoo"))]),
        )
        .unwrap();
}

/// zoo#1 in chicago with two cats already persisted on the backing resource.
pub fn seeded_zoo() -> (Store, Arc<InMemoryAdapter>) {
    let adapter = Arc::new(InMemoryAdapter::new());
    adapter.seed("/zoos/", vec![json!({"id": 1, "city": "chicago"})]);
    adapter.seed(
        "/cats/",
        vec![
            json!({"id": 2, "zoo": 1, "name": "mittens"}),
            json!({"id": 3, "zoo": 1, "name": "whiskers"}),
        ],
    );
    let store = zoo_store(Arc::clone(&adapter));
    (store, adapter)
}

/// Store with a flat person model, after the original person scenarios.
pub fn person_store() -> (Store, Arc<InMemoryAdapter>) {
    let adapter = Arc::new(InMemoryAdapter::new());
    let store = Store::new(Arc::clone(&adapter));
    store
        .register_model(
            "person",
            "/person/",
            schema([("id", attr()), ("name", attr()), ("age", attr())]),
        )
        .unwrap();
    (store, adapter)
}

/// Delegates to an [`InMemoryAdapter`] after yielding once, so reads stay
/// in flight long enough for a second caller to pile onto them.
pub struct SlowAdapter(pub Arc<InMemoryAdapter>);

#[async_trait]
impl Adapter for SlowAdapter {
    async fn create(&self, record: &Record) -> Result<State, AdapterError> {
        tokio::task::yield_now().await;
        self.0.create(record).await
    }

    async fn read_one(&self, model: &Model, id: &Value) -> Result<State, AdapterError> {
        tokio::task::yield_now().await;
        self.0.read_one(model, id).await
    }

    async fn read_all(&self, model: &Model) -> Result<Vec<State>, AdapterError> {
        tokio::task::yield_now().await;
        self.0.read_all(model).await
    }

    async fn update(&self, record: &Record) -> Result<State, AdapterError> {
        tokio::task::yield_now().await;
        self.0.update(record).await
    }

    async fn delete(&self, record: &Record) -> Result<(), AdapterError> {
        tokio::task::yield_now().await;
        self.0.delete(record).await
    }
}
