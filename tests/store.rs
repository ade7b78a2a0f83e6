mod support;

use record_store::{attr, schema, Patch, State, StoreError};
use serde_json::json;
use support::person_store;

fn state(value: serde_json::Value) -> State {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

#[tokio::test]
async fn saves_a_record() {
    let (store, adapter) = person_store();
    let bob = store
        .create_record("person", state(json!({"name": "bob", "age": 42})))
        .unwrap();

    bob.save().await.unwrap();

    assert!(bob.is_persisted());
    assert!(!bob.is_dirty());
    assert_eq!(bob.field("name"), Some(json!("bob")));
    assert_eq!(bob.field("age"), Some(json!(42)));

    let rows = adapter.rows("/person/");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("bob")));
    assert_eq!(rows[0].get("id"), bob.persisted_id().as_ref());
}

#[tokio::test]
async fn deletes_a_record() {
    let (store, adapter) = person_store();
    let bob = store
        .create_record("person", state(json!({"name": "bob"})))
        .unwrap();
    bob.save().await.unwrap();
    bob.destroy().await.unwrap();

    assert!(adapter.rows("/person/").is_empty());
    assert!(store.all("person").await.unwrap().is_empty());
}

#[tokio::test]
async fn saves_multiple_records() {
    let (store, adapter) = person_store();
    let bob = store
        .create_record("person", state(json!({"name": "bob"})))
        .unwrap();
    let will = store
        .create_record("person", state(json!({"name": "will"})))
        .unwrap();

    bob.save().await.unwrap();
    will.save().await.unwrap();

    assert!(bob.is_persisted());
    assert!(will.is_persisted());
    assert_ne!(bob.persisted_id(), will.persisted_id());
    assert_eq!(adapter.rows("/person/").len(), 2);
}

#[tokio::test]
async fn deletes_multiple_records() {
    let (store, adapter) = person_store();
    let bob = store
        .create_record("person", state(json!({"name": "bob"})))
        .unwrap();
    let will = store
        .create_record("person", state(json!({"name": "will"})))
        .unwrap();
    bob.save().await.unwrap();
    will.save().await.unwrap();

    bob.destroy().await.unwrap();
    will.destroy().await.unwrap();
    assert!(adapter.rows("/person/").is_empty());
}

#[tokio::test]
async fn fetches_a_single_record() {
    let (store, adapter) = person_store();
    adapter.seed("/person/", vec![json!({"id": 7, "name": "bob"})]);

    let record = store.get("person", 7).await.unwrap();
    assert_eq!(record.persisted_id(), Some(json!(7)));
    assert_eq!(record.field("name"), Some(json!("bob")));
    assert!(!record.is_dirty());
}

#[tokio::test]
async fn update_routes_to_the_adapter_update_operation() {
    let (store, adapter) = person_store();
    adapter.seed("/person/", vec![json!({"id": 7, "name": "bob"})]);

    let bob = store.get("person", 7).await.unwrap();
    bob.set_state(Patch::new().value("name", "robert"));
    bob.save().await.unwrap();

    assert_eq!(adapter.update_calls(), 1);
    assert_eq!(adapter.create_calls(), 0);
    assert_eq!(adapter.rows("/person/")[0].get("name"), Some(&json!("robert")));
    assert!(!bob.is_dirty());
}

#[tokio::test]
async fn save_with_applies_the_patch_first() {
    let (store, adapter) = person_store();
    let bob = store.create_record("person", State::new()).unwrap();
    bob.save_with(Patch::new().value("name", "bob")).await.unwrap();

    assert_eq!(adapter.rows("/person/")[0].get("name"), Some(&json!("bob")));
}

#[tokio::test]
async fn duplicate_model_registration_fails() {
    let (store, _) = person_store();
    let err = store
        .register_model("person", "/person/", schema([("id", attr())]))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::DuplicateModel {
            model: "person".into()
        }
    );
}

#[tokio::test]
async fn unknown_model_and_missing_id_fail_fast() {
    let (store, _) = person_store();
    assert!(matches!(
        store.get("dog", 1).await.unwrap_err(),
        StoreError::UnknownModel { .. }
    ));
    assert!(matches!(
        store.create_record("dog", State::new()).unwrap_err(),
        StoreError::UnknownModel { .. }
    ));
    assert!(matches!(
        store.get("person", serde_json::Value::Null).await.unwrap_err(),
        StoreError::MissingId { .. }
    ));
}

#[tokio::test]
async fn adapter_read_failures_are_wrapped_with_context() {
    let (store, _) = person_store();
    let err = store.get("person", 99).await.unwrap_err();
    match err {
        StoreError::Adapter {
            operation, model, ..
        } => {
            assert_eq!(operation, "read");
            assert_eq!(model, "person");
        }
        other => panic!("expected adapter error, got {}", other),
    }
}

#[tokio::test]
async fn change_listeners_run_synchronously_on_mutation() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let (store, _) = person_store();
    let bob = store
        .create_record("person", state(json!({"name": "bob"})))
        .unwrap();

    let changes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&changes);
    bob.on_change(move |patch| {
        assert!(patch.contains_key("name") || patch.contains_key("id"));
        seen.fetch_add(1, Ordering::SeqCst);
    });

    bob.set_state(Patch::new().value("name", "robert"));
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    // A patch that applies nothing notifies nobody.
    bob.set_state(Patch::new().value("unknown", 1));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_and_always_one_enforce_counts() {
    let (store, _) = person_store();

    let err = store.one("person").await.unwrap_err();
    assert_eq!(
        err,
        StoreError::ResultCount {
            model: "person".into(),
            found: 0
        }
    );

    let created = store.always_one("person").await.unwrap();
    assert!(!created.is_persisted());
    assert_eq!(store.one("person").await.unwrap(), created);

    store
        .create_record("person", state(json!({"name": "will"})))
        .unwrap();
    assert!(matches!(
        store.always_one("person").await.unwrap_err(),
        StoreError::ResultCount { found: 2, .. }
    ));
}
