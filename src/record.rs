//! Record - One entity instance with identity, schema-validated mutable
//! state, and dirty tracking.
//!
//! A [`Record`] is a cheap-clone handle around shared interior state, so
//! every holder observes the same entity. Canonical identity is the
//! persisted `id` when present, otherwise the process-unique transient
//! `cid` assigned at construction. That identity survives first
//! persistence: callers never need to re-look a record up after `save`
//! assigns a server id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::emitter::ChangeEmitter;
use crate::error::StoreError;
use crate::model::Model;
use crate::relation::{RelationKind, State};
use crate::store::{Store, StoreInner};

static NEXT_CID: AtomicU64 = AtomicU64::new(0);

/// `"c{n}"`, process-unique, never reused.
fn next_cid() -> String {
    format!("c{}", NEXT_CID.fetch_add(1, Ordering::Relaxed))
}

/// One entry of a [`Patch`]: a JSON value, or a record whose canonical
/// identity is stored when the patched field is a reference.
#[derive(Debug, Clone)]
pub enum PatchValue {
    Value(Value),
    Record(Record),
}

/// An ordered set of field updates for [`Record::set_state`].
#[derive(Debug, Clone, Default)]
pub struct Patch {
    entries: Vec<(String, PatchValue)>,
}

impl Patch {
    pub fn new() -> Self {
        Patch::default()
    }

    /// Set a field to a JSON value.
    pub fn value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), PatchValue::Value(value.into())));
        self
    }

    /// Set a reference field to another record. The record's canonical
    /// identity is what lands in state.
    pub fn record(mut self, field: impl Into<String>, record: &Record) -> Self {
        self.entries
            .push((field.into(), PatchValue::Record(record.clone())));
        self
    }

    /// Clear a field (sets it to JSON null).
    pub fn clear(self, field: impl Into<String>) -> Self {
        self.value(field, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<State> for Patch {
    fn from(state: State) -> Self {
        Patch {
            entries: state
                .into_iter()
                .map(|(field, value)| (field, PatchValue::Value(value)))
                .collect(),
        }
    }
}

/// Result of a relation accessor.
#[derive(Debug, Clone)]
pub enum Related {
    /// Raw state value of an attr field.
    Value(Value),
    /// Resolved hasOne/belongsTo target; `None` when no identity is set.
    One(Option<Record>),
    /// Resolved hasMany collection.
    Many(Vec<Record>),
}

impl Related {
    pub fn value(self) -> Value {
        match self {
            Related::Value(v) => v,
            _ => Value::Null,
        }
    }

    pub fn one(self) -> Option<Record> {
        match self {
            Related::One(record) => record,
            _ => None,
        }
    }

    pub fn many(self) -> Vec<Record> {
        match self {
            Related::Many(records) => records,
            _ => Vec::new(),
        }
    }
}

struct Cell {
    state: State,
    dirty: bool,
}

pub(crate) struct RecordInner {
    cid: String,
    model: Arc<Model>,
    store: Weak<StoreInner>,
    cell: RwLock<Cell>,
    emitter: ChangeEmitter,
}

/// Identity-tracked, schema-validated mutable entity state.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

/// Handle identity: two `Record`s are equal when they are the same
/// in-memory instance.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.cell.read();
        f.debug_struct("Record")
            .field("cid", &self.inner.cid)
            .field("model", &self.inner.model.name)
            .field("state", &cell.state)
            .field("dirty", &cell.dirty)
            .finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Record {
    pub(crate) fn new(model: Arc<Model>, state: State, store: Weak<StoreInner>) -> Record {
        Record::build(model, state, store, true)
    }

    /// A record materialized from adapter data starts clean: saving it
    /// without mutating it first must not touch the adapter.
    pub(crate) fn from_fetched(model: Arc<Model>, state: State, store: Weak<StoreInner>) -> Record {
        Record::build(model, state, store, false)
    }

    fn build(model: Arc<Model>, state: State, store: Weak<StoreInner>, dirty: bool) -> Record {
        Record {
            inner: Arc::new(RecordInner {
                cid: next_cid(),
                model,
                store,
                cell: RwLock::new(Cell { state, dirty }),
                emitter: ChangeEmitter::new(),
            }),
        }
    }

    /// Transient client-assigned identifier. Immutable, never reused.
    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    pub fn model_name(&self) -> &str {
        &self.inner.model.name
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.cell.read().dirty
    }

    /// Persisted id, when the backing resource has assigned one.
    pub fn persisted_id(&self) -> Option<Value> {
        self.inner
            .cell
            .read()
            .state
            .get("id")
            .filter(|id| !id.is_null())
            .cloned()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted_id().is_some()
    }

    /// Canonical identity: `state.id` if defined, else the cid.
    pub fn identity(&self) -> Value {
        self.persisted_id()
            .unwrap_or_else(|| Value::String(self.inner.cid.clone()))
    }

    /// True when `value` is either form of this record's identity. References
    /// held by other records may predate this record's first save and still
    /// carry the cid; both forms must keep matching.
    pub(crate) fn matches_identity(&self, value: &Value) -> bool {
        if let Some(id) = self.persisted_id() {
            if id == *value {
                return true;
            }
        }
        matches!(value, Value::String(s) if *s == self.inner.cid)
    }

    /// A clone of the current state map.
    pub fn state(&self) -> State {
        self.inner.cell.read().state.clone()
    }

    /// Current value of one state field.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.inner.cell.read().state.get(name).cloned()
    }

    /// Register a listener invoked synchronously with the applied patch
    /// after every successful state mutation.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.inner.emitter.on(listener);
    }

    /// Apply a patch to state.
    ///
    /// Fields not declared in the schema and hasMany fields are silently
    /// dropped (hasMany is always derived). A record patched onto a
    /// reference field is converted to its canonical identity. When
    /// anything applies, the record is marked dirty and `change` observers
    /// run before this call returns.
    pub fn set_state(&self, patch: impl Into<Patch>) {
        let applied = self.apply(patch.into(), true);
        if !applied.is_empty() {
            self.inner.emitter.emit(&applied);
        }
    }

    /// Merge the adapter's canonical state after a successful save. The
    /// dirty flag is cleared in the same write as the state, before
    /// observers run: a listener mutating the record during the
    /// notification re-dirties it instead of being clobbered.
    fn merge_canonical(&self, canonical: State) {
        let applied = self.apply(Patch::from(canonical), false);
        if applied.is_empty() {
            self.inner.cell.write().dirty = false;
        } else {
            self.inner.emitter.emit(&applied);
        }
    }

    fn apply(&self, patch: Patch, dirty: bool) -> State {
        // Resolve record identities before taking the cell lock; a record
        // may be attached to itself.
        let mut resolved: Vec<(String, Value)> = Vec::with_capacity(patch.entries.len());
        for (field, value) in patch.entries {
            let Some(relation) = self.inner.model.relation(&field) else {
                continue;
            };
            let value = match (relation.kind, value) {
                (RelationKind::HasMany, _) => continue,
                (_, PatchValue::Value(v)) => v,
                (kind, PatchValue::Record(record)) if kind.is_reference() => record.identity(),
                // No JSON rendition for a record on an attr field.
                (_, PatchValue::Record(_)) => continue,
            };
            resolved.push((field, value));
        }

        let mut applied = State::new();
        if !resolved.is_empty() {
            let mut cell = self.inner.cell.write();
            for (field, value) in resolved {
                cell.state.insert(field.clone(), value.clone());
                applied.insert(field, value);
            }
            cell.dirty = dirty;
        }
        applied
    }

    /// Persist this record through the store's adapter.
    ///
    /// Clean records resolve immediately without an adapter call. On
    /// success, the adapter's canonical state (e.g. a server-assigned id)
    /// is merged back and the record becomes clean; the handle itself
    /// never changes, so existing references stay valid.
    pub async fn save(&self) -> Result<(), StoreError> {
        if !self.is_dirty() {
            tracing::debug!(cid = %self.inner.cid, model = %self.inner.model.name, "record clean, skipping save");
            return Ok(());
        }
        let store = self.store()?;
        let canonical = store.save_record(self).await?;
        self.merge_canonical(canonical);
        Ok(())
    }

    /// Apply `patch` via [`Record::set_state`], then [`Record::save`].
    pub async fn save_with(&self, patch: impl Into<Patch>) -> Result<(), StoreError> {
        self.set_state(patch);
        self.save().await
    }

    /// Remove this record from the backing resource and the store cache.
    /// A never-persisted record resolves immediately with no adapter call.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        let store = self.store()?;
        store.destroy_record(self).await
    }

    /// Resolve a schema field asynchronously.
    ///
    /// Attr fields yield their raw state value. Reference fields resolve
    /// through the store, fetching from the adapter only on a cache miss.
    /// HasMany fields resolve as every record of the target model whose
    /// belongs-to field points back at this record, fetching the full
    /// target collection first if it was never fetched.
    pub async fn get(&self, field: &str) -> Result<Related, StoreError> {
        let relation = self.relation(field)?;
        match relation.kind {
            RelationKind::Attr => Ok(Related::Value(
                self.field(field).unwrap_or(Value::Null),
            )),
            RelationKind::HasOne | RelationKind::BelongsTo => {
                let target = relation.target().to_string();
                match self.field(field) {
                    None | Some(Value::Null) => Ok(Related::One(None)),
                    Some(identity) => {
                        let store = self.store()?;
                        Ok(Related::One(Some(store.get(&target, identity).await?)))
                    }
                }
            }
            RelationKind::HasMany => {
                let target = relation.target().to_string();
                let store = self.store()?;
                let candidates = store.all(&target).await?;
                self.filter_children(&store, &target, candidates)
            }
        }
    }

    /// Resolve a schema field against the cache only, synchronously.
    ///
    /// Fails with `NotCached` when the target record is not resident, or,
    /// for hasMany, when the target collection was never fully fetched.
    pub fn take(&self, field: &str) -> Result<Related, StoreError> {
        let relation = self.relation(field)?;
        match relation.kind {
            RelationKind::Attr => Ok(Related::Value(
                self.field(field).unwrap_or(Value::Null),
            )),
            RelationKind::HasOne | RelationKind::BelongsTo => {
                let target = relation.target().to_string();
                match self.field(field) {
                    None | Some(Value::Null) => Ok(Related::One(None)),
                    Some(identity) => {
                        let store = self.store()?;
                        match store.search_cache(&target, &identity)? {
                            Some(record) => Ok(Related::One(Some(record))),
                            None => Err(StoreError::NotCached {
                                model: target,
                                identity: Some(identity),
                            }),
                        }
                    }
                }
            }
            RelationKind::HasMany => {
                let target = relation.target().to_string();
                let store = self.store()?;
                if !store.fetched_all(&target)? {
                    return Err(StoreError::NotCached {
                        model: target,
                        identity: None,
                    });
                }
                let candidates = store.cached(&target)?;
                self.filter_children(&store, &target, candidates)
            }
        }
    }

    fn filter_children(
        &self,
        store: &Store,
        target: &str,
        candidates: Vec<Record>,
    ) -> Result<Related, StoreError> {
        let target_model = store.model(target)?;
        let Some(back) = target_model.belongs_to_field(&self.inner.model.name) else {
            // One-way reference: nothing on the target side points here.
            return Ok(Related::Many(Vec::new()));
        };
        let children = candidates
            .into_iter()
            .filter(|candidate| {
                candidate
                    .field(back)
                    .map_or(false, |value| self.matches_identity(&value))
            })
            .collect();
        Ok(Related::Many(children))
    }

    /// Serialize state for the backing resource.
    ///
    /// Only schema-declared fields are emitted. HasMany fields are always
    /// derived and never serialized. A reference field is emitted with the
    /// persisted id of its target, resolving a stale cid through the cache
    /// if the target has since been saved; references to records the
    /// backing resource does not yet know about are stripped entirely.
    pub fn to_json(&self) -> Value {
        let state = self.state();
        let store = self.inner.store.upgrade().map(|inner| Store { inner });
        let mut out = State::new();
        for (field, relation) in &self.inner.model.schema {
            match relation.kind {
                RelationKind::HasMany => {}
                RelationKind::Attr => {
                    if let Some(value) = state.get(field) {
                        out.insert(field.clone(), value.clone());
                    }
                }
                RelationKind::HasOne | RelationKind::BelongsTo => {
                    let Some(value) = state.get(field) else { continue };
                    if value.is_null() {
                        out.insert(field.clone(), Value::Null);
                        continue;
                    }
                    let resident = store
                        .as_ref()
                        .and_then(|s| s.search_cache(relation.target(), value).ok())
                        .flatten();
                    match resident {
                        Some(target) => {
                            if let Some(id) = target.persisted_id() {
                                out.insert(field.clone(), id);
                            }
                            // Unpersisted target: strip the field.
                        }
                        // Not resident: only persisted ids can reach state
                        // without their record being cached.
                        None => {
                            out.insert(field.clone(), value.clone());
                        }
                    }
                }
            }
        }
        Value::Object(out)
    }

    /// True iff this record's belongs-to field for `other`'s model equals
    /// `other`'s canonical identity.
    pub fn belongs_to_record(&self, other: &Record) -> bool {
        let Some(field) = self.inner.model.belongs_to_field(other.model_name()) else {
            return false;
        };
        self.field(field)
            .map_or(false, |value| other.matches_identity(&value))
    }

    /// Point this record's belongs-to field at `other`. Runs the same
    /// validation and notification path as `set_state`.
    pub fn attach_to(&self, other: &Record) -> Result<(), StoreError> {
        let field = self.belongs_to_field_for(other)?;
        self.set_state(Patch::new().record(field, other));
        Ok(())
    }

    /// Clear a declared reference field.
    pub fn detach(&self, field: &str) -> Result<(), StoreError> {
        let relation = self.relation(field)?;
        if !relation.kind.is_reference() {
            return Err(StoreError::UnknownRelation {
                model: self.inner.model.name.clone(),
                field: field.to_string(),
            });
        }
        self.set_state(Patch::new().clear(field));
        Ok(())
    }

    /// Clear the belongs-to field referencing `other`'s model.
    pub fn detach_from(&self, other: &Record) -> Result<(), StoreError> {
        let field = self.belongs_to_field_for(other)?;
        self.set_state(Patch::new().clear(field));
        Ok(())
    }

    fn belongs_to_field_for(&self, other: &Record) -> Result<String, StoreError> {
        self.inner
            .model
            .belongs_to_field(other.model_name())
            .map(str::to_string)
            .ok_or_else(|| StoreError::UnknownRelation {
                model: self.inner.model.name.clone(),
                field: other.model_name().to_string(),
            })
    }

    fn relation(&self, field: &str) -> Result<&crate::relation::Relation, StoreError> {
        self.inner
            .model
            .relation(field)
            .ok_or_else(|| StoreError::UnknownRelation {
                model: self.inner.model.name.clone(),
                field: field.to_string(),
            })
    }

    fn store(&self) -> Result<Store, StoreError> {
        self.inner
            .store
            .upgrade()
            .map(|inner| Store { inner })
            .ok_or(StoreError::StoreDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn cids_are_unique_and_stable() {
        let a = next_cid();
        let b = next_cid();
        assert_ne!(a, b);
        assert!(a.starts_with('c') && b.starts_with('c'));

        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(next_cid()));
        }
    }

    #[test]
    fn patch_builder_orders_entries() {
        let patch = Patch::new().value("a", 1).value("b", "two").clear("a");
        assert_eq!(patch.entries.len(), 3);
        assert_eq!(patch.entries[2].0, "a");
        assert!(matches!(
            patch.entries[2].1,
            PatchValue::Value(Value::Null)
        ));
    }

    #[test]
    fn related_accessors_are_forgiving() {
        assert_eq!(Related::One(None).many(), Vec::new());
        assert!(Related::Many(Vec::new()).one().is_none());
        assert_eq!(Related::Many(Vec::new()).value(), Value::Null);
    }
}
