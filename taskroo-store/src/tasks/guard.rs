//! Tag resolution and the tag-consistency guard.
//!
//! Tag references are resolved against the owner's catalogue before a
//! write. A tag deleted between that resolution and the write would leave a
//! dangling id behind, so every write is followed by [`TaskStore::revalidate_tags`],
//! which strips ids that no longer exist. Races are healed, never reported.

use serde_json::Value;
use taskroo_domain::{OwnerId, TagId, TagRef, TaskRecord};

use super::{TaskStore, TaskStoreError, by_id};
use crate::document::{self, Document, TAGS_KEY, Update};

/// How strictly tag references must match the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TagResolution {
    /// Every reference must name an existing tag.
    Strict,
    /// References are matched by name, then by id; a reference whose id no
    /// longer exists is dropped.
    Tolerant,
}

impl TaskStore {
    /// Translates caller tag references into ids, de-duplicated, in first
    /// reference order.
    pub(super) fn resolve_tag_refs(
        &self,
        owner: &OwnerId,
        refs: &[TagRef],
        mode: TagResolution,
    ) -> Result<Vec<TagId>, TaskStoreError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let catalogue = self.tags.all_for_owner(owner)?;
        let mut ids: Vec<TagId> = Vec::with_capacity(refs.len());
        for tag_ref in refs {
            let by_name = catalogue.iter().find(|t| t.name == tag_ref.name).map(|t| t.id);
            let resolved = match (by_name, mode, tag_ref.id) {
                (Some(id), _, _) => Some(id),
                (None, TagResolution::Tolerant, Some(id)) => {
                    if catalogue.iter().any(|t| t.id == id) {
                        Some(id)
                    } else {
                        tracing::warn!(
                            owner_id = %owner,
                            tag_id = %id,
                            name = %tag_ref.name,
                            "dropping reference to deleted tag"
                        );
                        None
                    }
                }
                (None, _, _) => {
                    return Err(TaskStoreError::Unsupported(format!(
                        "tag {:?} does not exist",
                        tag_ref.name
                    )));
                }
            };
            if let Some(id) = resolved.filter(|id| !ids.contains(id)) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Re-checks a freshly written record's tag ids against the tag store.
    ///
    /// If some of them were deleted concurrently, the stored document's tag
    /// list is overwritten with the surviving ids and the corrected record
    /// is returned. Calling this again on the result is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Store`] on a store failure. A tag race on
    /// its own is never an error.
    pub fn revalidate_tags(
        &self,
        owner: &OwnerId,
        mut record: TaskRecord,
    ) -> Result<TaskRecord, TaskStoreError> {
        if record.tags.is_empty() {
            return Ok(record);
        }
        let existing = self.tags.existing_ids_among(owner, &record.tags)?;
        if record.tags.iter().all(|id| existing.contains(id)) {
            return Ok(record);
        }

        let surviving: Vec<TagId> = record
            .tags
            .iter()
            .copied()
            .filter(|id| existing.contains(id))
            .collect();
        tracing::warn!(
            owner_id = %owner,
            task_id = %record.id,
            dropped = record.tags.len() - surviving.len(),
            "tags deleted during write, healing task"
        );

        let mut fields = Document::new();
        fields.insert(
            TAGS_KEY.to_string(),
            Value::Array(document::id_values(&surviving)),
        );
        match self
            .tasks
            .find_and_modify(&by_id(owner, &record.id), &Update::Set(fields))?
        {
            Some(doc) => Ok(document::decode(doc)?),
            None => {
                // Removed in the meantime; hand back what was written, healed.
                record.tags = surviving;
                Ok(record)
            }
        }
    }
}
