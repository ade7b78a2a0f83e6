//! Model - A named schema plus the resource locator the adapter uses.

use crate::error::StoreError;
use crate::relation::{DefaultValue, Relation, RelationKind, Schema, State};

/// A named schema registered with a store. Immutable after registration
/// and shared as `Arc<Model>` by every record it produces.
#[derive(Debug)]
pub struct Model {
    pub name: String,
    /// Resource locator handed to the adapter. Begins and ends with `/`.
    pub url: String,
    pub schema: Schema,
}

impl Model {
    pub(crate) fn new(name: &str, url: &str, schema: Schema) -> Result<Model, StoreError> {
        if !(url.starts_with('/') && url.ends_with('/')) {
            return Err(StoreError::InvalidUrl {
                model: name.to_string(),
                url: url.to_string(),
            });
        }
        for (field, relation) in &schema {
            if relation.kind != RelationKind::Attr && relation.target().is_empty() {
                return Err(StoreError::InvalidRelation {
                    model: name.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(Model {
            name: name.to_string(),
            url: url.to_string(),
            schema,
        })
    }

    /// The relation declared for `field`, if any.
    pub fn relation(&self, field: &str) -> Option<&Relation> {
        self.schema.get(field)
    }

    /// First schema field declared `belongs_to(target)`. This is the field
    /// a hasMany scan on `target`'s side matches against.
    pub(crate) fn belongs_to_field(&self, target: &str) -> Option<&str> {
        self.schema.iter().find_map(|(field, relation)| {
            (relation.kind == RelationKind::BelongsTo && relation.target() == target)
                .then_some(field.as_str())
        })
    }

    /// Merge caller-supplied state with schema defaults.
    ///
    /// Caller fields land first (unknown and hasMany fields dropped), then
    /// defaults fill the gaps in schema order; computed defaults see the
    /// partially built state.
    pub(crate) fn initial_state(&self, given: State) -> State {
        let mut state = State::new();
        for (field, value) in given {
            match self.schema.get(&field) {
                Some(relation) if relation.kind != RelationKind::HasMany => {
                    state.insert(field, value);
                }
                _ => {}
            }
        }
        for (field, relation) in &self.schema {
            if relation.kind == RelationKind::HasMany || state.contains_key(field) {
                continue;
            }
            match &relation.default {
                DefaultValue::None => {}
                DefaultValue::Literal(value) => {
                    state.insert(field.clone(), value.clone());
                }
                DefaultValue::Computed(f) => {
                    let value = f(&state);
                    state.insert(field.clone(), value);
                }
            }
        }
        state
    }
}
