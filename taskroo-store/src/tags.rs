//! Tag store.
//!
//! Tags live in their own collection, one document per tag:
//! `{_id, owner_id, name, color, visible_in_workview}`. Tasks reference
//! tags by id, so removing a tag also pulls its id out of every task
//! document of the owner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskroo_domain::{OwnerId, Tag, TagDraft, TagId};

use crate::document::{
    self, Collection, FINISHED_KEY, Filter, ID_KEY, OWNER_KEY, StoreError, TAGS_KEY, Update,
};

const NAME_KEY: &str = "name";

/// Errors from tag operations.
#[derive(Debug, thiserror::Error)]
pub enum TagStoreError {
    /// No tag with this id exists for the owner.
    #[error("tag not found: {0}")]
    NotFound(String),
    /// Another tag of the owner already uses this name.
    #[error("tag name already in use: {0}")]
    NameConflict(String),
    /// The request is structurally invalid.
    #[error("unsupported tag operation: {0}")]
    Unsupported(String),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of [`TagStore::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagInsert {
    /// A new tag was written.
    Created(Tag),
    /// The owner already had a tag with that name; it is returned unchanged.
    AlreadyExists(Tag),
}

impl TagInsert {
    /// The tag, whether new or pre-existing.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        match self {
            Self::Created(tag) | Self::AlreadyExists(tag) => tag,
        }
    }

    /// Consumes the outcome, returning the tag.
    #[must_use]
    pub fn into_tag(self) -> Tag {
        match self {
            Self::Created(tag) | Self::AlreadyExists(tag) => tag,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TagDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<TagId>,
    owner_id: OwnerId,
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(rename = "visible_in_workview", default)]
    visible_in_work_view: bool,
}

impl TagDocument {
    fn from_draft(owner: &OwnerId, draft: &TagDraft) -> Self {
        Self {
            id: None,
            owner_id: owner.clone(),
            name: draft.name.clone(),
            color: draft.color.clone(),
            visible_in_work_view: draft.visible_in_work_view,
        }
    }

    fn into_tag(self) -> Result<Tag, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::Malformed("tag document without _id".to_string()))?;
        Ok(Tag {
            id,
            owner_id: self.owner_id,
            name: self.name,
            color: self.color,
            visible_in_work_view: self.visible_in_work_view,
        })
    }
}

fn owned(owner: &OwnerId) -> Filter {
    Filter::eq(OWNER_KEY, owner.as_str())
}

fn by_id(owner: &OwnerId, id: &TagId) -> Filter {
    Filter::and([owned(owner), Filter::eq(ID_KEY, id.to_string())])
}

fn by_name(owner: &OwnerId, name: &str) -> Filter {
    Filter::and([owned(owner), Filter::eq(NAME_KEY, name)])
}

fn to_tag(doc: document::Document) -> Result<Tag, StoreError> {
    document::decode::<TagDocument>(doc)?.into_tag()
}

/// Owner-scoped access to the tag collection.
#[derive(Clone)]
pub struct TagStore {
    tags: Arc<dyn Collection>,
    tasks: Arc<dyn Collection>,
}

impl std::fmt::Debug for TagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagStore").finish_non_exhaustive()
    }
}

impl TagStore {
    /// Creates a store over the tag collection; `tasks` is the task
    /// collection, touched only to detach removed tags and count usage.
    #[must_use]
    pub fn new(tags: Arc<dyn Collection>, tasks: Arc<dyn Collection>) -> Self {
        Self { tags, tasks }
    }

    /// Every tag of the owner in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn all_for_owner(&self, owner: &OwnerId) -> Result<Vec<Tag>, StoreError> {
        self.tags
            .find(&owned(owner), None)?
            .into_iter()
            .map(to_tag)
            .collect()
    }

    /// Looks up one tag of the owner by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn find_by_id(&self, owner: &OwnerId, id: &TagId) -> Result<Option<Tag>, StoreError> {
        self.tags.find_one(&by_id(owner, id), None)?.map(to_tag).transpose()
    }

    /// Looks up one tag of the owner by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn find_by_name(&self, owner: &OwnerId, name: &str) -> Result<Option<Tag>, StoreError> {
        self.tags
            .find_one(&by_name(owner, name), None)?
            .map(to_tag)
            .transpose()
    }

    /// Returns `true` if the owner has a tag with this id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn exists_by_id(&self, owner: &OwnerId, id: &TagId) -> Result<bool, StoreError> {
        Ok(self.tags.count(&by_id(owner, id))? > 0)
    }

    /// Returns `true` if the owner has a tag with this name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn exists_by_name(&self, owner: &OwnerId, name: &str) -> Result<bool, StoreError> {
        Ok(self.tags.count(&by_name(owner, name))? > 0)
    }

    /// The subset of `ids` that still name a tag of the owner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the collection cannot be read.
    pub fn existing_ids_among(
        &self,
        owner: &OwnerId,
        ids: &[TagId],
    ) -> Result<HashSet<TagId>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let filter = Filter::and([owned(owner), Filter::is_in(ID_KEY, document::id_values(ids))]);
        self.tags
            .find(&filter, Some(&[]))?
            .into_iter()
            .map(|doc| {
                doc.get(ID_KEY)
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| StoreError::Malformed("tag document without _id".to_string()))
            })
            .collect()
    }

    /// Creates a tag, or returns the owner's existing tag with that name.
    ///
    /// # Errors
    ///
    /// Returns [`TagStoreError::Unsupported`] for an empty name, or
    /// [`TagStoreError::Store`] on a store failure.
    pub fn insert(&self, owner: &OwnerId, draft: &TagDraft) -> Result<TagInsert, TagStoreError> {
        if draft.name.trim().is_empty() {
            return Err(TagStoreError::Unsupported("tag name must not be empty".to_string()));
        }
        if let Some(existing) = self.find_by_name(owner, &draft.name)? {
            tracing::debug!(owner_id = %owner, tag_id = %existing.id, "tag name already present");
            return Ok(TagInsert::AlreadyExists(existing));
        }
        let doc = document::encode(&TagDocument::from_draft(owner, draft))?;
        let id: TagId = self
            .tags
            .insert(doc)?
            .parse()
            .map_err(|e| StoreError::Malformed(format!("store assigned a non-uuid id: {e}")))?;
        tracing::info!(owner_id = %owner, tag_id = %id, name = %draft.name, "tag created");
        Ok(TagInsert::Created(Tag {
            id,
            owner_id: owner.clone(),
            name: draft.name.clone(),
            color: draft.color.clone(),
            visible_in_work_view: draft.visible_in_work_view,
        }))
    }

    /// Overwrites a tag's name, color and visibility.
    ///
    /// # Errors
    ///
    /// Returns [`TagStoreError::NotFound`] if `id` names no tag of the
    /// owner, [`TagStoreError::NameConflict`] if another tag
    /// already uses the new name, [`TagStoreError::Unsupported`] for an
    /// empty name, or [`TagStoreError::Store`] on a store failure.
    pub fn update(
        &self,
        owner: &OwnerId,
        id: &TagId,
        draft: &TagDraft,
    ) -> Result<Tag, TagStoreError> {
        if draft.name.trim().is_empty() {
            return Err(TagStoreError::Unsupported("tag name must not be empty".to_string()));
        }
        let taken = self
            .find_by_name(owner, &draft.name)?
            .is_some_and(|other| other.id != *id);
        if taken {
            return Err(TagStoreError::NameConflict(draft.name.clone()));
        }
        let mut fields = document::encode(&TagDocument::from_draft(owner, draft))?;
        fields.remove(OWNER_KEY);
        let updated = self
            .tags
            .find_and_modify(&by_id(owner, id), &Update::Set(fields))?
            .ok_or_else(|| TagStoreError::NotFound(id.to_string()))?;
        tracing::info!(owner_id = %owner, tag_id = %id, "tag updated");
        Ok(to_tag(updated)?)
    }

    /// Deletes a tag and detaches it from every task of the owner.
    ///
    /// # Errors
    ///
    /// Returns [`TagStoreError::NotFound`] if `id` names no tag of the
    /// owner, or [`TagStoreError::Store`] on a store failure.
    pub fn remove(&self, owner: &OwnerId, id: &TagId) -> Result<(), TagStoreError> {
        if self.tags.remove(&by_id(owner, id))? == 0 {
            return Err(TagStoreError::NotFound(id.to_string()));
        }
        let detached = self.tasks.update_many(
            &Filter::and([owned(owner), Filter::contains(TAGS_KEY, id.to_string())]),
            &Update::pull_all(TAGS_KEY, [Value::String(id.to_string())]),
        )?;
        tracing::info!(owner_id = %owner, tag_id = %id, detached, "tag removed");
        Ok(())
    }

    /// Number of unfinished tasks carrying each of the owner's tags.
    ///
    /// Tags without unfinished tasks map to zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a collection cannot be read.
    pub fn unfinished_task_counts(
        &self,
        owner: &OwnerId,
    ) -> Result<HashMap<TagId, usize>, StoreError> {
        let mut counts: HashMap<TagId, usize> = self
            .all_for_owner(owner)?
            .into_iter()
            .map(|tag| (tag.id, 0))
            .collect();
        let unfinished = Filter::and([owned(owner), Filter::eq(FINISHED_KEY, false)]);
        for doc in self.tasks.find(&unfinished, Some(&[TAGS_KEY]))? {
            let Some(Value::Array(tags)) = doc.get(TAGS_KEY) else {
                continue;
            };
            let ids: HashSet<TagId> = tags
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| s.parse().ok())
                .collect();
            for id in ids {
                if let Some(count) = counts.get_mut(&id) {
                    *count += 1;
                }
            }
        }
        Ok(counts)
    }
}
