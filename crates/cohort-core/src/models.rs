//! Domain models for groups, relations, memberships and invites.

pub mod group;
pub mod invite;
pub mod membership;
pub mod metadata;
pub mod relation;
