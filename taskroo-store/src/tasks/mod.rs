//! Hierarchical task store.
//!
//! Each task is one flat document whose `path` field lists its ancestors
//! from the root down. The store keeps those paths consistent across
//! structural changes without multi-document transactions: every mutation
//! is a short sequence of individually atomic collection calls, followed by
//! a post-condition check that repairs the tree if another request
//! interfered.
//!
//! The store is split by concern:
//!
//! - `path` resolves a task's stored ancestor chain.
//! - `mutate` inserts, updates and removes tasks.
//! - `hierarchy` re-parents tasks and moves them back to top level.
//! - `guard` keeps tag references pointing at live tags.

mod guard;
mod hierarchy;
mod mutate;
mod path;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskroo_domain::{BuildMode, Forest, OwnerId, TaskId, TaskRecord, TaskTree, build_forest};

use crate::document::{
    self, Collection, Document, FINISHED_KEY, Filter, ID_KEY, OWNER_KEY, PATH_KEY, StoreError,
};
use crate::tags::TagStore;

/// Errors from task operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    /// The task (or parent) does not exist for the owner.
    #[error("task not found: {0}")]
    NotFound(String),
    /// The request is structurally invalid: self-parenting, a cycle,
    /// pre-nested input, or an unknown tag.
    #[error("unsupported task operation: {0}")]
    Unsupported(String),
    /// A concurrent structural change was detected and the attempted
    /// mutation was rolled back or discarded.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owner-scoped access to the task collection.
#[derive(Clone)]
pub struct TaskStore {
    tasks: Arc<dyn Collection>,
    tags: TagStore,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore").finish_non_exhaustive()
    }
}

fn owned(owner: &OwnerId) -> Filter {
    Filter::eq(OWNER_KEY, owner.as_str())
}

fn by_id(owner: &OwnerId, id: &TaskId) -> Filter {
    Filter::and([owned(owner), Filter::eq(ID_KEY, id.to_string())])
}

/// Selects the task itself and every document whose path contains it.
fn subtree_filter(owner: &OwnerId, id: &TaskId) -> Filter {
    Filter::and([
        owned(owner),
        Filter::or([
            Filter::eq(ID_KEY, id.to_string()),
            Filter::contains(PATH_KEY, id.to_string()),
        ]),
    ])
}

fn decode_records(docs: Vec<Document>) -> Result<Vec<TaskRecord>, StoreError> {
    docs.into_iter().map(document::decode).collect()
}

/// Ids of records whose path is not `path(parent) + [parent]` all the way
/// up, judged against the other records of the batch.
fn torn_records(records: &[TaskRecord]) -> HashSet<TaskId> {
    let paths: HashMap<TaskId, &[TaskId]> =
        records.iter().map(|r| (r.id, r.path.as_slice())).collect();
    records
        .iter()
        .filter(|r| {
            !r.path
                .iter()
                .enumerate()
                .all(|(depth, ancestor)| paths.get(ancestor).is_some_and(|p| *p == &r.path[..depth]))
        })
        .map(|r| r.id)
        .collect()
}

fn within(
    date: Option<DateTime<Utc>>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> bool {
    date.is_some_and(|d| after.is_none_or(|a| d >= a) && before.is_none_or(|b| d <= b))
}

impl TaskStore {
    /// Creates a store over the task collection, consulting `tags` for
    /// tag resolution.
    #[must_use]
    pub fn new(tasks: Arc<dyn Collection>, tags: TagStore) -> Self {
        Self { tasks, tags }
    }

    /// The tag store this task store resolves tags through.
    #[must_use]
    pub const fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Every task of the owner as a forest.
    ///
    /// Records whose stored path does not agree with their ancestors' paths
    /// are left out, together with their descendants. That happens when an
    /// ancestor is gone, or when two moves interleave and a task was attached
    /// under a chain that changed meanwhile; both are transient states that
    /// a concurrent move is about to repair.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Store`] if a collection cannot be read.
    pub fn find_all_by_owner(&self, owner: &OwnerId) -> Result<Forest, TaskStoreError> {
        let records = decode_records(self.tasks.find(&owned(owner), None)?)?;
        let torn = torn_records(&records);
        let (complete, dangling): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| !torn.contains(&r.id));
        for record in &dangling {
            tracing::warn!(
                owner_id = %owner,
                task_id = %record.id,
                "skipping task whose ancestor chain is incomplete"
            );
        }
        let catalogue = self.tags.all_for_owner(owner)?;
        Ok(build_forest(&complete, &catalogue, BuildMode::Complete))
    }

    /// The owner's unfinished tasks. A task whose parent is finished
    /// surfaces as a root.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Store`] if a collection cannot be read.
    pub fn find_unfinished_by_owner(&self, owner: &OwnerId) -> Result<Forest, TaskStoreError> {
        let filter = Filter::and([owned(owner), Filter::eq(FINISHED_KEY, false)]);
        self.find_partial(owner, &filter, |_| true)
    }

    /// The owner's finished tasks closed within the inclusive bounds.
    /// Either bound may be omitted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::Store`] if a collection cannot be read.
    pub fn find_finished_closed_between(
        &self,
        owner: &OwnerId,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Forest, TaskStoreError> {
        let filter = Filter::and([owned(owner), Filter::eq(FINISHED_KEY, true)]);
        self.find_partial(owner, &filter, |r| within(r.closed_date, after, before))
    }

    /// A task and all of its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if the task does not exist for
    /// the owner, or [`TaskStoreError::Store`] on a store failure.
    pub fn find_subtree(&self, owner: &OwnerId, id: &TaskId) -> Result<TaskTree, TaskStoreError> {
        self.find_partial(owner, &subtree_filter(owner, id), |_| true)?
            .subtree(id)
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))
    }

    /// The stored record of one task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if the task does not exist for
    /// the owner, or [`TaskStoreError::Store`] on a store failure.
    pub fn find_record(&self, owner: &OwnerId, id: &TaskId) -> Result<TaskRecord, TaskStoreError> {
        let doc = self
            .tasks
            .find_one(&by_id(owner, id), None)?
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        Ok(document::decode(doc)?)
    }

    fn find_partial(
        &self,
        owner: &OwnerId,
        filter: &Filter,
        keep: impl Fn(&TaskRecord) -> bool,
    ) -> Result<Forest, TaskStoreError> {
        let mut records = decode_records(self.tasks.find(filter, None)?)?;
        records.retain(|r| keep(r));
        let catalogue = self.tags.all_for_owner(owner)?;
        Ok(build_forest(&records, &catalogue, BuildMode::Partial))
    }
}
