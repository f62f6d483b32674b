//! Integration tests for the hierarchical task store.
//!
//! Drives the store through insert, re-parenting, promotion to top level
//! and subtree removal on an in-memory collection, checking both the
//! returned trees and the materialized paths left behind.
//!
//! Verification command: `cargo test --test task_hierarchy`

use std::sync::Arc;

use taskroo_domain::{OwnerId, TaskDraft, TaskId};
use taskroo_store::{MemoryCollection, TagStore, TaskStore, TaskStoreError};

// =============================================================================
// Helpers
// =============================================================================

fn new_store() -> TaskStore {
    let tasks = Arc::new(MemoryCollection::new());
    let tags = TagStore::new(Arc::new(MemoryCollection::new()), tasks.clone());
    TaskStore::new(tasks, tags)
}

fn u1() -> OwnerId {
    OwnerId::new("u1").unwrap()
}

fn insert(store: &TaskStore, owner: &OwnerId, title: &str) -> TaskId {
    store.insert(owner, TaskDraft::new(title)).unwrap().id
}

fn roots(store: &TaskStore, owner: &OwnerId) -> Vec<TaskId> {
    store
        .find_all_by_owner(owner)
        .unwrap()
        .roots()
        .map(|t| t.id)
        .collect()
}

// =============================================================================
// Reads after insert
// =============================================================================

#[test]
fn inserted_task_is_a_lone_root() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "A");

    let forest = store.find_all_by_owner(&owner).unwrap();

    assert_eq!(forest.len(), 1);
    let root = forest.roots().next().unwrap();
    assert_eq!(root.id, t1);
    assert_eq!(root.title, "A");
    assert!(forest.subtasks_of(&t1).is_empty());
    assert!(store.resolve_path(&owner, &t1, false).unwrap().is_empty());
}

#[test]
fn owners_never_see_each_other() {
    let store = new_store();
    let owner = u1();
    let other = OwnerId::new("u2").unwrap();
    let mine = insert(&store, &owner, "mine");
    let theirs = insert(&store, &other, "theirs");

    assert_eq!(roots(&store, &owner), vec![mine]);
    assert_eq!(roots(&store, &other), vec![theirs]);
    let err = store.resolve_path(&owner, &theirs, true).unwrap_err();
    assert!(matches!(err, TaskStoreError::NotFound(_)));
}

// =============================================================================
// Re-parenting
// =============================================================================

#[test]
fn add_subtask_nests_and_returns_parent() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");
    let t2 = insert(&store, &owner, "T2");

    let tree = store.add_subtask(&owner, &t1, &t2).unwrap();

    assert_eq!(tree.task.id, t1);
    let subtasks: Vec<_> = tree.subtasks.iter().map(|s| s.task.id).collect();
    assert_eq!(subtasks, vec![t2]);
    assert_eq!(store.resolve_path(&owner, &t2, true).unwrap(), vec![t1, t2]);
    assert_eq!(roots(&store, &owner), vec![t1]);
}

#[test]
fn add_subtask_into_own_descendant_is_unsupported() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");
    let t2 = insert(&store, &owner, "T2");
    let t3 = insert(&store, &owner, "T3");
    store.add_subtask(&owner, &t1, &t2).unwrap();
    store.add_subtask(&owner, &t2, &t3).unwrap();

    let err = store.add_subtask(&owner, &t3, &t1).unwrap_err();

    assert!(matches!(err, TaskStoreError::Unsupported(_)));
    assert_eq!(store.resolve_path(&owner, &t3, false).unwrap(), vec![t1, t2]);
    assert!(store.resolve_path(&owner, &t1, false).unwrap().is_empty());
}

#[test]
fn add_subtask_rejects_every_ancestor_of_the_parent() {
    let store = new_store();
    let owner = u1();
    let chain: Vec<TaskId> = (0..5).map(|i| insert(&store, &owner, &format!("c{i}"))).collect();
    for pair in chain.windows(2) {
        store.add_subtask(&owner, &pair[0], &pair[1]).unwrap();
    }
    let leaf = chain[4];

    for ancestor in store.resolve_path(&owner, &leaf, true).unwrap() {
        let err = store.add_subtask(&owner, &leaf, &ancestor).unwrap_err();
        assert!(matches!(err, TaskStoreError::Unsupported(_)));
    }
}

#[test]
fn add_subtask_across_owners_is_not_found() {
    let store = new_store();
    let owner = u1();
    let other = OwnerId::new("u2").unwrap();
    let mine = insert(&store, &owner, "mine");
    let theirs = insert(&store, &other, "theirs");

    let foreign_parent = store.add_subtask(&owner, &theirs, &mine);
    assert!(matches!(foreign_parent, Err(TaskStoreError::NotFound(_))));
    let foreign_subtask = store.add_subtask(&owner, &mine, &theirs);
    assert!(matches!(foreign_subtask, Err(TaskStoreError::NotFound(_))));
    assert!(store.resolve_path(&other, &theirs, false).unwrap().is_empty());
}

#[test]
fn moving_a_subtree_carries_descendants_along() {
    let store = new_store();
    let owner = u1();
    let a = insert(&store, &owner, "A");
    let b = insert(&store, &owner, "B");
    let c = insert(&store, &owner, "C");
    let d = insert(&store, &owner, "D");
    store.add_subtask(&owner, &a, &b).unwrap();
    store.add_subtask(&owner, &b, &c).unwrap();

    let tree = store.add_subtask(&owner, &d, &b).unwrap();

    assert_eq!(tree.len(), 3);
    assert_eq!(store.resolve_path(&owner, &c, false).unwrap(), vec![d, b]);
    let forest = store.find_all_by_owner(&owner).unwrap();
    assert_eq!(forest.path_of(&c), Some(vec![d, b]));
    assert!(forest.subtasks_of(&a).is_empty());
}

#[test]
fn siblings_keep_insertion_order() {
    let store = new_store();
    let owner = u1();
    let parent = insert(&store, &owner, "parent");
    let kids: Vec<TaskId> = (0..4).map(|i| insert(&store, &owner, &format!("k{i}"))).collect();
    for kid in kids.iter().rev() {
        store.add_subtask(&owner, &parent, kid).unwrap();
    }

    let tree = store.find_subtree(&owner, &parent).unwrap();

    let order: Vec<_> = tree.subtasks.iter().map(|s| s.task.id).collect();
    assert_eq!(order, kids);
}

// =============================================================================
// Promotion to top level
// =============================================================================

#[test]
fn move_to_top_level_empties_path() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");
    let t2 = insert(&store, &owner, "T2");
    store.add_subtask(&owner, &t1, &t2).unwrap();

    let tree = store.move_to_top_level(&owner, &t2).unwrap();

    assert_eq!(tree.task.id, t2);
    assert!(store.resolve_path(&owner, &t2, false).unwrap().is_empty());
    let mut found = roots(&store, &owner);
    found.sort();
    let mut expected = vec![t1, t2];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn move_to_top_level_keeps_relative_paths_below() {
    let store = new_store();
    let owner = u1();
    let ids: Vec<TaskId> = (0..4).map(|i| insert(&store, &owner, &format!("t{i}"))).collect();
    for pair in ids.windows(2) {
        store.add_subtask(&owner, &pair[0], &pair[1]).unwrap();
    }

    store.move_to_top_level(&owner, &ids[2]).unwrap();

    assert_eq!(store.resolve_path(&owner, &ids[3], false).unwrap(), vec![ids[2]]);
    assert_eq!(store.resolve_path(&owner, &ids[1], false).unwrap(), vec![ids[0]]);
}

#[test]
fn move_to_top_level_of_unknown_task_is_not_found() {
    let store = new_store();
    let err = store.move_to_top_level(&u1(), &TaskId::new()).unwrap_err();
    assert!(matches!(err, TaskStoreError::NotFound(_)));
}

// =============================================================================
// Removal
// =============================================================================

#[test]
fn remove_deletes_whole_subtree_in_one_call() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");
    let t2 = insert(&store, &owner, "T2");
    let t3 = insert(&store, &owner, "T3");
    let keep = insert(&store, &owner, "keep");
    store.add_subtask(&owner, &t1, &t2).unwrap();
    store.add_subtask(&owner, &t2, &t3).unwrap();

    let removed = store.remove(&owner, &t1).unwrap();

    assert_eq!(removed, 3);
    let forest = store.find_all_by_owner(&owner).unwrap();
    assert_eq!(forest.len(), 1);
    assert!(forest.get(&keep).is_some());
    for gone in [t1, t2, t3] {
        assert!(forest.get(&gone).is_none());
    }
}

#[test]
fn remove_of_inner_task_leaves_ancestors() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");
    let t2 = insert(&store, &owner, "T2");
    let t3 = insert(&store, &owner, "T3");
    store.add_subtask(&owner, &t1, &t2).unwrap();
    store.add_subtask(&owner, &t2, &t3).unwrap();

    assert_eq!(store.remove(&owner, &t2).unwrap(), 2);

    assert_eq!(roots(&store, &owner), vec![t1]);
    assert!(store.find_subtree(&owner, &t1).unwrap().subtasks.is_empty());
}

#[test]
fn remove_is_owner_scoped() {
    let store = new_store();
    let owner = u1();
    let t1 = insert(&store, &owner, "T1");

    let err = store.remove(&OwnerId::new("u2").unwrap(), &t1).unwrap_err();

    assert!(matches!(err, TaskStoreError::NotFound(_)));
    assert_eq!(roots(&store, &owner), vec![t1]);
}
