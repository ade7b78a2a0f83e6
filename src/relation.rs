//! Relations - The schema vocabulary for models.
//!
//! A schema maps field names to [`Relation`] values built with the
//! constructors below:
//!
//! ```ignore
//! use record_store::{attr, belongs_to, has_many, schema};
//!
//! let zoo = schema([
//!     ("id", attr()),
//!     ("city", attr_default("unknown")),
//!     ("cats", has_many("cat")),
//! ]);
//! let cat = schema([
//!     ("id", attr()),
//!     ("name", attr()),
//!     ("zoo", belongs_to("zoo")),
//! ]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Record state: field name to JSON value.
pub type State = serde_json::Map<String, Value>;

/// Schema: field name to relation, ordered for stable iteration.
pub type Schema = BTreeMap<String, Relation>;

/// Discriminant for the four field kinds. Resolution logic switches on
/// this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Attr,
    HasOne,
    HasMany,
    BelongsTo,
}

impl RelationKind {
    /// Reference kinds store the identity of another record in state.
    pub fn is_reference(self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::BelongsTo)
    }
}

/// Default for an attribute field, applied at record creation.
///
/// Literal defaults are cloned per record and computed defaults are
/// re-evaluated per record against the partially built state, so two
/// records never share a default by reference.
#[derive(Clone)]
pub enum DefaultValue {
    None,
    Literal(Value),
    Computed(Arc<dyn Fn(&State) -> Value + Send + Sync>),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => write!(f, "None"),
            DefaultValue::Literal(v) => write!(f, "Literal({})", v),
            DefaultValue::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// One schema field: a plain attribute or a reference to another model.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    /// Target model name. Always `None` for `Attr`.
    pub target: Option<String>,
    pub default: DefaultValue,
}

impl Relation {
    pub(crate) fn target(&self) -> &str {
        self.target.as_deref().unwrap_or_default()
    }
}

/// A plain attribute with no default.
pub fn attr() -> Relation {
    Relation {
        kind: RelationKind::Attr,
        target: None,
        default: DefaultValue::None,
    }
}

/// A plain attribute with a literal default, cloned into each new record.
pub fn attr_default(value: impl Into<Value>) -> Relation {
    Relation {
        kind: RelationKind::Attr,
        target: None,
        default: DefaultValue::Literal(value.into()),
    }
}

/// A plain attribute whose default is computed per record from the
/// partially built state.
pub fn attr_computed<F>(f: F) -> Relation
where
    F: Fn(&State) -> Value + Send + Sync + 'static,
{
    Relation {
        kind: RelationKind::Attr,
        target: None,
        default: DefaultValue::Computed(Arc::new(f)),
    }
}

/// Reference to a single record of `model`, stored as its identity.
pub fn has_one(model: impl Into<String>) -> Relation {
    Relation {
        kind: RelationKind::HasOne,
        target: Some(model.into()),
        default: DefaultValue::None,
    }
}

/// Derived collection: all records of `model` whose belongs-to field
/// points back at the owning record. Never stored in state.
pub fn has_many(model: impl Into<String>) -> Relation {
    Relation {
        kind: RelationKind::HasMany,
        target: Some(model.into()),
        default: DefaultValue::None,
    }
}

/// Reference to the owning record of `model`, stored as its identity.
pub fn belongs_to(model: impl Into<String>) -> Relation {
    Relation {
        kind: RelationKind::BelongsTo,
        target: Some(model.into()),
        default: DefaultValue::None,
    }
}

/// Build a [`Schema`] from `(field, relation)` pairs.
pub fn schema<'a>(fields: impl IntoIterator<Item = (&'a str, Relation)>) -> Schema {
    fields
        .into_iter()
        .map(|(name, relation)| (name.to_string(), relation))
        .collect()
}
