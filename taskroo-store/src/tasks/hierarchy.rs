//! Structural mutations: re-parenting and promotion to top level.
//!
//! A move rewrites the path of the moved task and of every descendant
//! with two bulk updates: strip the old ancestor prefix, then prepend the
//! new one. The store cannot run both, and the reads they depend on, in
//! one transaction, so [`TaskStore::add_subtask`] checks its
//! post-conditions afterwards and compensates when a concurrent request
//! deleted or moved one of the new ancestors in between.

use taskroo_domain::{MAX_TREE_DEPTH, OwnerId, TaskId, TaskTree};

use super::path::stored_path;
use super::{TaskStore, TaskStoreError, owned, subtree_filter};
use crate::document::{Filter, ID_KEY, PATH_KEY, Update, id_values};

impl TaskStore {
    /// Moves `subtask_id`, with its whole subtree, under `parent_id`, and
    /// returns the parent's subtree.
    ///
    /// # Errors
    ///
    /// - [`TaskStoreError::NotFound`] if the parent or the subtask does not
    ///   exist for the owner.
    /// - [`TaskStoreError::Unsupported`] if the task would become its own
    ///   parent or the subtask is an ancestor of the parent, or if the move
    ///   would nest tasks deeper than [`MAX_TREE_DEPTH`].
    /// - [`TaskStoreError::ConcurrentModification`] if an ancestor of the
    ///   parent was deleted or moved while the subtask was being attached.
    ///   In the first case the moved subtree is discarded, in the second
    ///   the subtask is left at top level. A parent removed after the
    ///   attach takes the subtree with it and is reported the same way.
    /// - [`TaskStoreError::Store`] on a store failure.
    pub fn add_subtask(
        &self,
        owner: &OwnerId,
        parent_id: &TaskId,
        subtask_id: &TaskId,
    ) -> Result<TaskTree, TaskStoreError> {
        let parent_path = self.resolve_path(owner, parent_id, true)?;
        if parent_id == subtask_id {
            return Err(TaskStoreError::Unsupported(format!(
                "task {subtask_id} cannot be its own parent"
            )));
        }
        if parent_path.contains(subtask_id) {
            return Err(TaskStoreError::Unsupported(format!(
                "task {subtask_id} is an ancestor of {parent_id}"
            )));
        }

        let subtree = subtree_filter(owner, subtask_id);
        let current_path = self.path_of(owner, subtask_id)?;
        let deepest = parent_path.len() + self.levels_below(&subtree, current_path.len())?;
        if deepest > MAX_TREE_DEPTH {
            return Err(TaskStoreError::Unsupported(format!(
                "moving {subtask_id} under {parent_id} would nest {deepest} levels deep"
            )));
        }

        if !current_path.is_empty() {
            self.tasks
                .update_many(&subtree, &Update::pull_all(PATH_KEY, id_values(&current_path)))?;
        }
        self.tasks
            .update_many(&subtree, &Update::push_front(PATH_KEY, id_values(&parent_path)))?;

        let ancestors = Filter::and([owned(owner), Filter::is_in(ID_KEY, id_values(&parent_path))]);
        if self.tasks.count(&ancestors)? != parent_path.len() {
            let discarded = self.tasks.remove(&subtree)?;
            tracing::warn!(
                owner_id = %owner,
                parent_id = %parent_id,
                subtask_id = %subtask_id,
                discarded,
                "ancestor deleted during move, subtree discarded"
            );
            return Err(TaskStoreError::ConcurrentModification(format!(
                "an ancestor of {parent_id} was deleted"
            )));
        }

        let observed = match self.resolve_path(owner, parent_id, true) {
            Ok(path) => Some(path),
            Err(TaskStoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if observed.as_ref() != Some(&parent_path) {
            match self.move_to_top_level(owner, subtask_id) {
                Ok(_) => tracing::warn!(
                    owner_id = %owner,
                    parent_id = %parent_id,
                    subtask_id = %subtask_id,
                    "ancestor moved during move, subtask returned to top level"
                ),
                // A removal of the parent took the attached subtree with it.
                Err(TaskStoreError::NotFound(_)) => tracing::warn!(
                    owner_id = %owner,
                    parent_id = %parent_id,
                    subtask_id = %subtask_id,
                    "parent removed during move, subtree went with it"
                ),
                Err(e) => return Err(e),
            }
            return Err(TaskStoreError::ConcurrentModification(format!(
                "an ancestor of {parent_id} was moved or removed"
            )));
        }

        tracing::info!(
            owner_id = %owner,
            parent_id = %parent_id,
            subtask_id = %subtask_id,
            "subtask attached"
        );
        self.find_subtree(owner, parent_id)
    }

    /// Detaches a task, with its whole subtree, from its parent and returns
    /// the task's subtree.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] if the task does not exist for
    /// the owner, or [`TaskStoreError::Store`] on a store failure.
    pub fn move_to_top_level(
        &self,
        owner: &OwnerId,
        id: &TaskId,
    ) -> Result<TaskTree, TaskStoreError> {
        let current_path = self.path_of(owner, id)?;
        if !current_path.is_empty() {
            self.tasks.update_many(
                &subtree_filter(owner, id),
                &Update::pull_all(PATH_KEY, id_values(&current_path)),
            )?;
            tracing::info!(owner_id = %owner, task_id = %id, "task moved to top level");
        }
        self.find_subtree(owner, id)
    }

    /// How many levels the deepest descendant sits below the subtree root.
    fn levels_below(&self, subtree: &Filter, root_depth: usize) -> Result<usize, TaskStoreError> {
        let mut levels = 0;
        for doc in self.tasks.find(subtree, Some(&[PATH_KEY]))? {
            levels = levels.max(stored_path(&doc)?.len().saturating_sub(root_depth));
        }
        Ok(levels)
    }
}
