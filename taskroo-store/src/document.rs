//! Schemaless document model and the collection contract.
//!
//! A [`Collection`] offers the handful of primitives the task store needs:
//! find (with an optional projection), insert, atomic find-and-modify,
//! bulk update, remove, and count. Each primitive is atomic on its own;
//! nothing spans more than one call.
//!
//! Selectors are equality, list membership and array containment tests,
//! composed with `and`/`or`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Key holding a document's identifier.
pub const ID_KEY: &str = "_id";

/// Owner key shared by task and tag documents.
pub(crate) const OWNER_KEY: &str = "owner_id";
/// Task ancestor chain, root first.
pub(crate) const PATH_KEY: &str = "path";
/// Tag ids on a task document.
pub(crate) const TAGS_KEY: &str = "tags";
pub(crate) const FINISHED_KEY: &str = "finished";

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Errors raised by a document collection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not serve the request.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    /// A document with the same `_id` already exists.
    #[error("duplicate document id: {0}")]
    DuplicateId(String),
    /// A stored document does not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),
    /// Conversion between typed values and documents failed.
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A document selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value.
    Eq(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field is an array containing the value.
    Contains(String, Value),
    /// Every inner filter matches.
    And(Vec<Filter>),
    /// At least one inner filter matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// `field == value`.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    /// `field in values`.
    pub fn is_in(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::In(field.to_string(), values.into_iter().collect())
    }

    /// `value in field` for array fields.
    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Self::Contains(field.to_string(), value.into())
    }

    /// Conjunction of filters.
    pub fn and(filters: impl IntoIterator<Item = Self>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    /// Disjunction of filters.
    pub fn or(filters: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq(field, value) => doc.get(field) == Some(value),
            Self::In(field, values) => doc.get(field).is_some_and(|v| values.contains(v)),
            Self::Contains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

/// A modification applied to every matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Overwrites the listed fields, leaving the rest untouched.
    Set(Document),
    /// Removes every occurrence of the values from an array field.
    PullAll {
        /// Array field to modify.
        field: String,
        /// Values to remove.
        values: Vec<Value>,
    },
    /// Inserts the values, in order, at the front of an array field.
    PushFront {
        /// Array field to modify; created if absent.
        field: String,
        /// Values to prepend.
        values: Vec<Value>,
    },
}

impl Update {
    /// Builds a [`Update::PullAll`].
    pub fn pull_all(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::PullAll {
            field: field.to_string(),
            values: values.into_iter().collect(),
        }
    }

    /// Builds a [`Update::PushFront`].
    pub fn push_front(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::PushFront {
            field: field.to_string(),
            values: values.into_iter().collect(),
        }
    }

    /// Applies the modification to a document in place.
    ///
    /// `_id` is never overwritten by [`Update::Set`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if an array operation targets a
    /// field holding something other than an array.
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        match self {
            Self::Set(fields) => {
                for (key, value) in fields {
                    if key != ID_KEY {
                        doc.insert(key.clone(), value.clone());
                    }
                }
            }
            Self::PullAll { field, values } => match doc.get_mut(field) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => items.retain(|item| !values.contains(item)),
                Some(_) => {
                    return Err(StoreError::Malformed(format!("field {field} is not an array")));
                }
            },
            Self::PushFront { field, values } => {
                let slot = doc
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let Value::Array(items) = slot else {
                    return Err(StoreError::Malformed(format!("field {field} is not an array")));
                };
                items.splice(0..0, values.iter().cloned());
            }
        }
        Ok(())
    }
}

/// Collection-scoped document primitives.
///
/// Implementations must make each call atomic and isolated with respect to
/// every other call on the same collection.
pub trait Collection: Send + Sync {
    /// Returns matching documents in insertion order, optionally keeping
    /// only the projected fields (plus `_id`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot serve the query.
    fn find(&self, filter: &Filter, projection: Option<&[&str]>)
    -> Result<Vec<Document>, StoreError>;

    /// Returns the first matching document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot serve the query.
    fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.find(filter, projection)?.into_iter().next())
    }

    /// Inserts a document, assigning an `_id` when absent, and returns the id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if the supplied `_id` is taken.
    fn insert(&self, doc: Document) -> Result<String, StoreError>;

    /// Applies `update` to the first matching document and returns it as
    /// modified, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update cannot be applied.
    fn find_and_modify(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError>;

    /// Applies `update` to every matching document, returning how many
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update cannot be applied.
    fn update_many(&self, filter: &Filter, update: &Update) -> Result<usize, StoreError>;

    /// Deletes every matching document, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot serve the request.
    fn remove(&self, filter: &Filter) -> Result<usize, StoreError>;

    /// Counts matching documents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot serve the query.
    fn count(&self, filter: &Filter) -> Result<usize, StoreError>;
}

/// Serializes a typed value into a document.
///
/// # Errors
///
/// Returns [`StoreError::Malformed`] if the value does not serialize to a
/// JSON object.
pub fn encode<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Malformed(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Deserializes a document into a typed value.
///
/// # Errors
///
/// Returns [`StoreError::Codec`] if the document does not match `T`.
pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Converts displayable ids into JSON string values.
pub fn id_values<'a, I, T>(ids: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a T>,
    T: std::fmt::Display + 'a,
{
    ids.into_iter().map(|id| Value::String(id.to_string())).collect()
}
