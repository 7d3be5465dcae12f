//! Cohort Core: domain models, error taxonomy and repository traits for
//! group relations, memberships and invitations.
//!
//! This crate has no storage dependency; `cohort-db` implements the
//! repository traits against SurrealDB.

pub mod error;
pub mod id;
pub mod models;
pub mod page;
pub mod repository;
