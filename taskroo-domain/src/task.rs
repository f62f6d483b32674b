//! Task model: the in-memory entity, its flat persisted record, and the
//! caller-facing draft used for inserts and updates.
//!
//! A [`TaskRecord`] is one document of the task collection. Hierarchy is
//! encoded in its `path` field, the ordered ancestor ids from the forest
//! root down to (but excluding) the task itself:
//!
//! ```text
//! path(T) == path(parent(T)) + [id(parent(T))]      (empty for roots)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, TagId, TaskId};
use crate::tag::Tag;

/// Deepest ancestor chain a task may sit under.
pub const MAX_TREE_DEPTH: usize = 32;

/// A task as materialized for callers, without hierarchy links.
///
/// Hierarchy lives in [`crate::tree::Forest`], which owns every node and
/// links parents and subtasks by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Owner of this task; never exposed on the wire.
    #[serde(skip_serializing)]
    pub owner_id: OwnerId,
    /// Required, non-empty title.
    pub title: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When work on the task may start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// When the task is due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// When the task was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    /// When the task was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_date: Option<DateTime<Utc>>,
    /// Whether the task is done.
    pub finished: bool,
    /// Tags in first-attached order, unique by id.
    tags: Vec<Tag>,
}

impl Task {
    /// Materializes a record, resolving its tag ids through `lookup`.
    ///
    /// Ids `lookup` cannot resolve are dropped: they refer to tags deleted
    /// since the record was written.
    pub fn from_record<'a>(record: &TaskRecord, lookup: impl Fn(&TagId) -> Option<&'a Tag>) -> Self {
        let mut task = Self {
            id: record.id,
            owner_id: record.owner_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            start_date: record.start_date,
            due_date: record.due_date,
            created_date: record.created_date,
            closed_date: record.closed_date,
            finished: record.finished,
            tags: Vec::with_capacity(record.tags.len()),
        };
        for tag in record.tags.iter().filter_map(&lookup) {
            task.add_tag(tag.clone());
        }
        task
    }

    /// Attaches a tag, returning `false` if a tag with the same id is
    /// already present.
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag(&tag.id) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Returns `true` if the task carries the tag with the given id.
    #[must_use]
    pub fn has_tag(&self, id: &TagId) -> bool {
        self.tags.iter().any(|t| t.id == *id)
    }

    /// Tags in the order they were attached.
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }
}

/// The flat persisted form of a task: one document in the task collection.
///
/// Field names follow the stored layout
/// (`_id, owner_id, title, ..., tags, path`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: TaskId,
    /// Owner of the document.
    pub owner_id: OwnerId,
    /// Task title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Optional start date.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Optional closing timestamp.
    #[serde(default)]
    pub closed_date: Option<DateTime<Utc>>,
    /// Completion flag.
    #[serde(default)]
    pub finished: bool,
    /// Referenced tag ids.
    #[serde(default)]
    pub tags: Vec<TagId>,
    /// Ancestor ids, root first; empty for top-level tasks.
    #[serde(default)]
    pub path: Vec<TaskId>,
}

impl TaskRecord {
    /// Immediate parent id (last element of the path), if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<TaskId> {
        self.path.last().copied()
    }

    /// Returns `true` if the record has no ancestors.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.path.is_empty()
    }

    /// Serialized path used to order records so ancestors precede
    /// descendants: every ancestor's key is a strict prefix of its
    /// descendants' keys.
    #[must_use]
    pub fn path_key(&self) -> String {
        let mut key = String::with_capacity(self.path.len() * 37);
        for ancestor in &self.path {
            key.push_str(&ancestor.to_string());
            key.push(',');
        }
        key
    }
}

/// A tag reference in caller input: a name, and optionally the id the
/// caller last saw for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRef {
    /// Tag id, if known to the caller.
    #[serde(default)]
    pub id: Option<TagId>,
    /// Tag name.
    pub name: String,
}

impl TagRef {
    /// References a tag by name only.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// References a tag by name and id.
    #[must_use]
    pub fn with_id(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

impl From<&Tag> for TagRef {
    fn from(tag: &Tag) -> Self {
        Self::with_id(tag.id, tag.name.clone())
    }
}

/// Caller input for inserting or updating a task.
///
/// `subtasks` and `parent_task` exist so that malformed input can be
/// recognized and rejected: tasks are always inserted at top level and
/// moved with the hierarchy operations afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Task title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional start date.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Optional due date.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// Creation date; defaulted on insert when absent.
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Optional closing date.
    #[serde(default)]
    pub closed_date: Option<DateTime<Utc>>,
    /// Completion flag.
    #[serde(default)]
    pub finished: bool,
    /// Tags to attach.
    #[serde(default)]
    pub tags: Vec<TagRef>,
    /// Nested subtasks; must be empty on insert.
    #[serde(default)]
    pub subtasks: Vec<TaskDraft>,
    /// Parent reference; must be absent on insert.
    #[serde(default)]
    pub parent_task: Option<TaskId>,
}

impl TaskDraft {
    /// Creates a top-level, unfinished draft with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag reference.
    #[must_use]
    pub fn with_tag(mut self, tag: TagRef) -> Self {
        self.tags.push(tag);
        self
    }

    /// Sets the completion flag and closing date.
    #[must_use]
    pub fn finished_at(mut self, closed: DateTime<Utc>) -> Self {
        self.finished = true;
        self.closed_date = Some(closed);
        self
    }
}
