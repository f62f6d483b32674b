//! Path resolution.

use serde_json::Value;
use taskroo_domain::{OwnerId, TaskId};

use super::{TaskStore, TaskStoreError, by_id};
use crate::document::{Document, PATH_KEY, StoreError};

/// Reads the ancestor chain stored on a (possibly projected) document.
pub(super) fn stored_path(doc: &Document) -> Result<Vec<TaskId>, StoreError> {
    match doc.get(PATH_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(path) => Ok(serde_json::from_value(path.clone())?),
    }
}

impl TaskStore {
    /// The stored ancestor chain of a task, root first, optionally followed
    /// by the task itself.
    ///
    /// This is the authorization check for every path-dependent mutation: a
    /// task belonging to another owner is indistinguishable from a missing
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if the task does not exist for
    /// the owner, or [`TaskStoreError::Store`] on a store failure.
    pub fn resolve_path(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        include_self: bool,
    ) -> Result<Vec<TaskId>, TaskStoreError> {
        let mut path = self.path_of(owner, id)?;
        if include_self {
            path.push(*id);
        }
        Ok(path)
    }

    pub(super) fn path_of(
        &self,
        owner: &OwnerId,
        id: &TaskId,
    ) -> Result<Vec<TaskId>, TaskStoreError> {
        let doc = self
            .tasks
            .find_one(&by_id(owner, id), Some(&[PATH_KEY]))?
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        Ok(stored_path(&doc)?)
    }
}
