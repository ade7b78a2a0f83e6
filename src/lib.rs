//! record_store - An identity-mapped in-memory record layer.
//!
//! Applications register schema'd models with a [`Store`], then create and
//! fetch [`Record`]s through it. The store keeps at most one record
//! instance per model + identity, resolves `hasOne`/`hasMany`/`belongsTo`
//! relations between records whose identity may still be transient
//! (client-assigned cid) or already permanent (server-assigned id), and
//! talks to the backing resource only through a pluggable async
//! [`Adapter`].
//!
//! There is exactly one process and one in-memory store per `Store`
//! instance; this is not a distributed consistency system, and durability
//! is whatever the adapter provides.

mod adapter;
mod emitter;
mod error;
mod model;
mod record;
mod relation;
mod store;

pub use adapter::{Adapter, AdapterError, InMemoryAdapter};
pub use error::StoreError;
pub use model::Model;
pub use record::{Patch, PatchValue, Record, Related};
pub use relation::{
    attr, attr_computed, attr_default, belongs_to, has_many, has_one, schema, DefaultValue,
    Relation, RelationKind, Schema, State,
};
pub use store::Store;
