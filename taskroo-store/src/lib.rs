//! `TaskRoo` storage layer.
//!
//! Exposes the document collection abstraction, an in-memory backend, the
//! tag store, and the hierarchical task store that keeps materialized
//! paths consistent without multi-document transactions.

pub mod document;
pub mod memory;
pub mod tags;
pub mod tasks;

pub use document::{Collection, Document, Filter, StoreError, Update};
pub use memory::MemoryCollection;
pub use tags::{TagInsert, TagStore, TagStoreError};
pub use tasks::{TaskStore, TaskStoreError};
