//! Single-document writes: insert, update, and subtree removal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskroo_domain::{OwnerId, TagId, Task, TaskDraft, TaskId, TaskRecord, build_flat};

use super::guard::TagResolution;
use super::{TaskStore, TaskStoreError, by_id, subtree_filter};
use crate::document::{self, StoreError, Update};

/// Mutable attributes, in stored field names.
#[derive(Serialize)]
struct TaskFields<'a> {
    title: &'a str,
    description: Option<&'a str>,
    start_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    closed_date: Option<DateTime<Utc>>,
    finished: bool,
    tags: &'a [TagId],
}

/// A brand-new document; the collection assigns `_id`.
#[derive(Serialize)]
struct NewTask<'a> {
    owner_id: &'a OwnerId,
    #[serde(flatten)]
    fields: TaskFields<'a>,
    created_date: DateTime<Utc>,
    path: &'a [TaskId],
}

fn check_title(draft: &TaskDraft) -> Result<(), TaskStoreError> {
    if draft.title.trim().is_empty() {
        return Err(TaskStoreError::Unsupported("task title must not be empty".to_string()));
    }
    Ok(())
}

impl TaskStore {
    /// Writes a new top-level task.
    ///
    /// Tag references must all name existing tags of the owner. The
    /// creation date defaults to now.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Unsupported`] if the draft carries subtasks
    /// or a parent, has an empty title, or names an unknown tag, or
    /// [`TaskStoreError::Store`] on a store failure.
    pub fn insert(&self, owner: &OwnerId, draft: TaskDraft) -> Result<Task, TaskStoreError> {
        if !draft.subtasks.is_empty() {
            return Err(TaskStoreError::Unsupported(
                "tasks are inserted without subtasks".to_string(),
            ));
        }
        if draft.parent_task.is_some() {
            return Err(TaskStoreError::Unsupported(
                "tasks are inserted at top level".to_string(),
            ));
        }
        check_title(&draft)?;
        let tags = self.resolve_tag_refs(owner, &draft.tags, TagResolution::Strict)?;
        let created_date = draft.created_date.unwrap_or_else(Utc::now);

        let doc = document::encode(&NewTask {
            owner_id: owner,
            fields: TaskFields {
                title: &draft.title,
                description: draft.description.as_deref(),
                start_date: draft.start_date,
                due_date: draft.due_date,
                closed_date: draft.closed_date,
                finished: draft.finished,
                tags: &tags,
            },
            created_date,
            path: &[],
        })?;
        let id: TaskId = self
            .tasks
            .insert(doc)?
            .parse()
            .map_err(|e| StoreError::Malformed(format!("store assigned a non-uuid id: {e}")))?;
        tracing::info!(owner_id = %owner, task_id = %id, "task inserted");

        let record = TaskRecord {
            id,
            owner_id: owner.clone(),
            title: draft.title,
            description: draft.description,
            due_date: draft.due_date,
            start_date: draft.start_date,
            created_date: Some(created_date),
            closed_date: draft.closed_date,
            finished: draft.finished,
            tags,
            path: Vec::new(),
        };
        let record = self.revalidate_tags(owner, record)?;
        self.materialize(owner, record)
    }

    /// Replaces the mutable attributes of a task: title, description,
    /// dates, completion, and tags. The creation date and the task's place
    /// in the hierarchy are left alone; `subtasks` and `parent_task` in the
    /// draft are ignored.
    ///
    /// Tags are matched by name, then by id for renamed tags; references to
    /// tags deleted in the meantime are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if the task does not exist for
    /// the owner, [`TaskStoreError::Unsupported`] for an empty title or a
    /// name-only reference to an unknown tag, or [`TaskStoreError::Store`]
    /// on a store failure.
    pub fn update(
        &self,
        owner: &OwnerId,
        id: &TaskId,
        draft: &TaskDraft,
    ) -> Result<Task, TaskStoreError> {
        check_title(draft)?;
        let tags = self.resolve_tag_refs(owner, &draft.tags, TagResolution::Tolerant)?;
        let fields = document::encode(&TaskFields {
            title: &draft.title,
            description: draft.description.as_deref(),
            start_date: draft.start_date,
            due_date: draft.due_date,
            closed_date: draft.closed_date,
            finished: draft.finished,
            tags: &tags,
        })?;

        let doc = self
            .tasks
            .find_and_modify(&by_id(owner, id), &Update::Set(fields))?
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        tracing::debug!(owner_id = %owner, task_id = %id, "task updated");

        let record = self.revalidate_tags(owner, document::decode(doc)?)?;
        self.materialize(owner, record)
    }

    /// Deletes a task together with its whole subtree in one call and
    /// returns how many documents went away.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if nothing matched, or
    /// [`TaskStoreError::Store`] on a store failure.
    pub fn remove(&self, owner: &OwnerId, id: &TaskId) -> Result<usize, TaskStoreError> {
        let removed = self.tasks.remove(&subtree_filter(owner, id))?;
        if removed == 0 {
            return Err(TaskStoreError::NotFound(id.to_string()));
        }
        tracing::info!(owner_id = %owner, task_id = %id, removed, "task subtree removed");
        Ok(removed)
    }

    fn materialize(&self, owner: &OwnerId, record: TaskRecord) -> Result<Task, TaskStoreError> {
        let catalogue = self.tags.all_for_owner(owner)?;
        let id = record.id;
        build_flat(&[record], &catalogue)
            .pop()
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))
    }
}
