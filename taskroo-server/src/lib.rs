//! `TaskRoo` server library.
//!
//! Exposes the HTTP router and configuration for use in tests and
//! embedding. Every route is scoped to the owner named by a trusted
//! request header.

pub mod api;
pub mod config;
