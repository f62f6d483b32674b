//! Tree reconstruction from flat, path-stamped task records.
//!
//! The store keeps one document per task and encodes the hierarchy in each
//! document's ancestor path. This module turns such a batch back into
//! linked trees:
//!
//! 1. Records are ordered by their serialized path so that every parent is
//!    visited before any of its children (ties keep input order).
//! 2. A record with an empty path is a root. In [`BuildMode::Partial`] a
//!    record whose immediate parent is not part of the batch is a root too,
//!    which lets any subtree be rebuilt as if it were top-level.
//! 3. Every other record is attached to its immediate parent.
//! 4. Tag ids are resolved through the owner's tag catalogue; ids missing
//!    from the catalogue are dropped.
//!
//! The result is a [`Forest`]: an arena owning every node, with parent and
//! subtask links stored as indices.

use std::collections::HashMap;

use serde::Serialize;

use crate::ids::{TagId, TaskId};
use crate::tag::Tag;
use crate::task::{Task, TaskRecord};

/// How to treat records whose parent is not in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// The batch holds every task of the owner; a missing parent is a
    /// consistency fault.
    Complete,
    /// The batch is a filtered or subtree fetch; orphans become roots.
    Partial,
}

#[derive(Debug, Clone)]
struct Node {
    task: Task,
    parent: Option<usize>,
    subtasks: Vec<usize>,
}

/// An ordered collection of task trees for one owner.
///
/// Roots keep first-seen order and each node's subtasks keep the order in
/// which they were attached.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    index: HashMap<TaskId, usize>,
}

impl Forest {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            roots: Vec::new(),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn push(&mut self, task: Task, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        self.index.insert(task.id, idx);
        self.nodes.push(Node {
            task,
            parent,
            subtasks: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].subtasks.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    /// Number of tasks in the forest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the forest holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level tasks in first-seen order.
    pub fn roots(&self) -> impl Iterator<Item = &Task> {
        self.roots.iter().map(|&i| &self.nodes[i].task)
    }

    /// Every task, parents before their subtasks.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.nodes.iter().map(|n| &n.task)
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.nodes[i].task)
    }

    /// The parent of `id`, or `None` for roots and unknown ids.
    #[must_use]
    pub fn parent_of(&self, id: &TaskId) -> Option<&Task> {
        let idx = *self.index.get(id)?;
        self.nodes[idx].parent.map(|p| &self.nodes[p].task)
    }

    /// Direct subtasks of `id` in attachment order.
    #[must_use]
    pub fn subtasks_of(&self, id: &TaskId) -> Vec<&Task> {
        self.index.get(id).map_or_else(Vec::new, |&i| {
            self.nodes[i]
                .subtasks
                .iter()
                .map(|&s| &self.nodes[s].task)
                .collect()
        })
    }

    /// Ancestor ids of `id` within this forest, root first.
    #[must_use]
    pub fn path_of(&self, id: &TaskId) -> Option<Vec<TaskId>> {
        let mut cursor = self.nodes[*self.index.get(id)?].parent;
        let mut path = Vec::new();
        while let Some(idx) = cursor {
            path.push(self.nodes[idx].task.id);
            cursor = self.nodes[idx].parent;
        }
        path.reverse();
        Some(path)
    }

    /// Returns `true` if `candidate` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_in_subtree(&self, ancestor: &TaskId, candidate: &TaskId) -> bool {
        let (Some(&top), Some(&start)) = (self.index.get(ancestor), self.index.get(candidate))
        else {
            return false;
        };
        let mut cursor = self.nodes[start].parent;
        while let Some(idx) = cursor {
            if idx == top {
                return true;
            }
            cursor = self.nodes[idx].parent;
        }
        false
    }

    /// `(task, parent)` pairs for every task, parents first.
    #[must_use]
    pub fn edges(&self) -> Vec<(TaskId, Option<TaskId>)> {
        self.nodes
            .iter()
            .map(|n| (n.task.id, n.parent.map(|p| self.nodes[p].task.id)))
            .collect()
    }

    /// Nested, owned trees for every root.
    #[must_use]
    pub fn to_trees(&self) -> Vec<TaskTree> {
        self.roots.iter().map(|&i| self.tree_at(i)).collect()
    }

    /// The nested tree rooted at `id`.
    #[must_use]
    pub fn subtree(&self, id: &TaskId) -> Option<TaskTree> {
        self.index.get(id).map(|&i| self.tree_at(i))
    }

    fn tree_at(&self, idx: usize) -> TaskTree {
        let node = &self.nodes[idx];
        TaskTree {
            task: node.task.clone(),
            subtasks: node.subtasks.iter().map(|&s| self.tree_at(s)).collect(),
        }
    }
}

/// A task with its subtasks nested, as handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTree {
    /// The task itself.
    #[serde(flatten)]
    pub task: Task,
    /// Owned subtasks in attachment order.
    pub subtasks: Vec<TaskTree>,
}

impl TaskTree {
    /// Total number of tasks in this tree, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.subtasks.iter().map(Self::len).sum::<usize>()
    }

    /// Always `false`: a tree holds at least its root.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Finds a task anywhere in this tree.
    #[must_use]
    pub fn find(&self, id: &TaskId) -> Option<&Self> {
        if self.task.id == *id {
            return Some(self);
        }
        self.subtasks.iter().find_map(|s| s.find(id))
    }
}

fn tag_lookup(catalogue: &[Tag]) -> HashMap<TagId, &Tag> {
    catalogue.iter().map(|t| (t.id, t)).collect()
}

/// Rebuilds linked trees from a flat batch of records.
///
/// # Panics
///
/// In [`BuildMode::Complete`], panics if a record names a parent that is
/// not in the batch. A complete fetch can only produce that through a
/// data-consistency bug, and continuing would silently lose the subtree.
#[must_use]
pub fn build_forest(records: &[TaskRecord], catalogue: &[Tag], mode: BuildMode) -> Forest {
    let tags = tag_lookup(catalogue);

    let mut ordered: Vec<(String, &TaskRecord)> =
        records.iter().map(|r| (r.path_key(), r)).collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut forest = Forest::with_capacity(records.len());
    for (_, record) in ordered {
        let task = Task::from_record(record, |id| tags.get(id).copied());
        let parent = match record.parent_id() {
            None => None,
            Some(parent_id) => match (forest.index.get(&parent_id), mode) {
                (Some(&p), _) => Some(p),
                (None, BuildMode::Partial) => None,
                (None, BuildMode::Complete) => panic!(
                    "parent {parent_id} of task {} missing from a complete task set",
                    record.id
                ),
            },
        };
        forest.push(task, parent);
    }
    forest
}

/// Materializes each record on its own, in input order.
///
/// This is a plain materializer: paths are ignored and no parent or
/// subtask links are produced, whatever the batch holds. Callers that need
/// the hierarchy, partial or complete, use [`build_forest`].
#[must_use]
pub fn build_flat(records: &[TaskRecord], catalogue: &[Tag]) -> Vec<Task> {
    let tags = tag_lookup(catalogue);
    records
        .iter()
        .map(|r| Task::from_record(r, |id| tags.get(id).copied()))
        .collect()
}
