//! In-memory document collection.
//!
//! Documents live in a single insertion-ordered `Vec` behind a
//! [`RwLock`]; every primitive takes the lock once, so each call is atomic
//! and isolated from concurrent callers. Ids are UUID v7 strings.

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::document::{Collection, Document, Filter, ID_KEY, StoreError, Update};

/// Thread-safe, in-memory implementation of [`Collection`].
#[derive(Debug, Default)]
pub struct MemoryCollection {
    docs: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns `true` if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

fn project(doc: &Document, projection: Option<&[&str]>) -> Document {
    match projection {
        None => doc.clone(),
        Some(fields) => doc
            .iter()
            .filter(|(key, _)| key.as_str() == ID_KEY || fields.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

impl Collection for MemoryCollection {
    fn find(
        &self,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.read();
        Ok(docs
            .iter()
            .filter(|d| filter.matches(d))
            .map(|d| project(d, projection))
            .collect())
    }

    fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read();
        Ok(docs
            .iter()
            .find(|d| filter.matches(d))
            .map(|d| project(d, projection)))
    }

    fn insert(&self, mut doc: Document) -> Result<String, StoreError> {
        let mut docs = self.docs.write();
        let id = match doc.get(ID_KEY) {
            None | Some(Value::Null) => Uuid::now_v7().to_string(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(StoreError::Malformed(format!("unsupported _id value {other}")));
            }
        };
        if docs
            .iter()
            .any(|d| d.get(ID_KEY).and_then(Value::as_str) == Some(id.as_str()))
        {
            return Err(StoreError::DuplicateId(id));
        }
        doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
        docs.push(doc);
        drop(docs);
        Ok(id)
    }

    fn find_and_modify(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write();
        let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) else {
            return Ok(None);
        };
        let mut modified = doc.clone();
        update.apply(&mut modified)?;
        doc.clone_from(&modified);
        drop(docs);
        Ok(Some(modified))
    }

    fn update_many(&self, filter: &Filter, update: &Update) -> Result<usize, StoreError> {
        let mut docs = self.docs.write();
        // Stage every change first so a failing document leaves the batch untouched.
        let mut staged = Vec::new();
        for (idx, doc) in docs.iter().enumerate() {
            if filter.matches(doc) {
                let mut modified = doc.clone();
                update.apply(&mut modified)?;
                staged.push((idx, modified));
            }
        }
        let matched = staged.len();
        for (idx, modified) in staged {
            docs[idx] = modified;
        }
        drop(docs);
        Ok(matched)
    }

    fn remove(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut docs = self.docs.write();
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok(before - docs.len())
    }

    fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.docs.read().iter().filter(|d| filter.matches(d)).count())
    }
}
