//! Cohort Database: SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - Implementations of the `cohort-core` repository traits, all sharing one
//!   filter composer for their paginated listings

mod connection;
mod error;
mod query;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{
    SurrealGroupRepository, SurrealInviteRepository, SurrealMembershipRepository,
    SurrealRelationRepository,
};
pub use schema::{run_migrations, schema_ddl};
