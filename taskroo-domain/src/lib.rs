//! Shared model for `TaskRoo`: tasks, tags, identifiers, and the
//! reconstruction of task trees from flat, path-stamped records.

pub mod ids;
pub mod tag;
pub mod task;
pub mod tree;

pub use ids::{IdError, OwnerId, TagId, TaskId};
pub use tag::{Tag, TagDraft};
pub use task::{MAX_TREE_DEPTH, TagRef, Task, TaskDraft, TaskRecord};
pub use tree::{BuildMode, Forest, TaskTree, build_flat, build_forest};
