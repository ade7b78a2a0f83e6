use std::fmt;

use serde_json::Value;

use crate::adapter::AdapterError;

/// Error type for store, record, and relation operations.
///
/// Structural misuse (unknown model, bad schema, missing id) surfaces from
/// the synchronous prefix of an operation; data-availability failures
/// (adapter errors, count mismatches) surface through the async result of
/// the call that hit them. The store performs no retries.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A model with this name is already registered.
    DuplicateModel { model: String },
    /// A reference relation in the schema does not name a target model.
    InvalidRelation { model: String, field: String },
    /// Model url must begin and end with a forward slash.
    InvalidUrl { model: String, url: String },
    /// Operation referenced a model name that was never registered.
    UnknownModel { model: String },
    /// `get` called with a null id.
    MissingId { model: String },
    /// Relation accessor referenced a field absent from the schema.
    UnknownRelation { model: String, field: String },
    /// Synchronous relation access (`take`) targeted data that is not
    /// resident. `identity` is `None` when a full collection was never
    /// fetched.
    NotCached {
        model: String,
        identity: Option<Value>,
    },
    /// `one`/`always_one` found an unexpected number of records.
    ResultCount { model: String, found: usize },
    /// An adapter call failed. Carries the operation and model for context.
    Adapter {
        operation: &'static str,
        model: String,
        message: String,
    },
    /// A record outlived the store it was created by.
    StoreDropped,
}

impl StoreError {
    pub(crate) fn adapter(operation: &'static str, model: &str, err: AdapterError) -> Self {
        StoreError::Adapter {
            operation,
            model: model.to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateModel { model } => {
                write!(f, "model \"{}\" already exists", model)
            }
            StoreError::InvalidRelation { model, field } => write!(
                f,
                "relation \"{}\" on model \"{}\" does not name a target model",
                field, model
            ),
            StoreError::InvalidUrl { model, url } => write!(
                f,
                "url \"{}\" for model \"{}\" must begin and end with a forward slash",
                url, model
            ),
            StoreError::UnknownModel { model } => {
                write!(f, "model \"{}\" is not registered", model)
            }
            StoreError::MissingId { model } => {
                write!(f, "get on model \"{}\" requires an id", model)
            }
            StoreError::UnknownRelation { model, field } => write!(
                f,
                "field \"{}\" is not declared in the schema of model \"{}\"",
                field, model
            ),
            StoreError::NotCached { model, identity } => match identity {
                Some(id) => write!(f, "record {} of model \"{}\" is not cached", id, model),
                None => write!(f, "collection \"{}\" was never fully fetched", model),
            },
            StoreError::ResultCount { model, found } => write!(
                f,
                "expected exactly one \"{}\" record, found {}",
                model, found
            ),
            StoreError::Adapter {
                operation,
                model,
                message,
            } => write!(
                f,
                "adapter {} failed for model \"{}\": {}",
                operation, model, message
            ),
            StoreError::StoreDropped => write!(f, "record outlived its store"),
        }
    }
}

impl std::error::Error for StoreError {}
