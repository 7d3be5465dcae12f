//! Error types for the group relations subsystem.
//!
//! Store failures are translated into [`CohortError`] exactly once, at the
//! repository boundary. Callers classify errors through
//! [`CohortError::kind`] rather than by inspecting messages.

use std::fmt;

use thiserror::Error;

use crate::models::relation::MemberKind;

/// Classification of a [`CohortError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MalformedEntity,
    Conflict,
    GroupNotEmpty,
    MemberAlreadyAssigned,
    ThingAlreadyAssigned,
    ChannelAlreadyAssigned,
    GroupMembershipExists,
    CreateEntity,
    UpdateEntity,
    RemoveEntity,
    RetrieveEntity,
}

impl ErrorKind {
    /// Whether this kind belongs to the uniqueness/reference conflict class.
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            ErrorKind::Conflict
                | ErrorKind::MemberAlreadyAssigned
                | ErrorKind::ThingAlreadyAssigned
                | ErrorKind::ChannelAlreadyAssigned
                | ErrorKind::GroupMembershipExists
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::MalformedEntity => "malformed entity",
            ErrorKind::Conflict => "conflict",
            ErrorKind::GroupNotEmpty => "group not empty",
            ErrorKind::MemberAlreadyAssigned => "member already assigned",
            ErrorKind::ThingAlreadyAssigned => "thing already assigned",
            ErrorKind::ChannelAlreadyAssigned => "channel already assigned",
            ErrorKind::GroupMembershipExists => "group membership exists",
            ErrorKind::CreateEntity => "create entity",
            ErrorKind::UpdateEntity => "update entity",
            ErrorKind::RemoveEntity => "remove entity",
            ErrorKind::RetrieveEntity => "retrieve entity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Malformed entity: {reason}")]
    MalformedEntity { reason: String },

    #[error("Entity conflict: {reason}")]
    Conflict { reason: String },

    #[error("Group {group_id} is still referenced by relations, memberships or invites")]
    GroupNotEmpty { group_id: String },

    #[error("{kind} is already assigned to group {group_id}: {cause}")]
    AlreadyAssigned {
        kind: MemberKind,
        group_id: String,
        cause: String,
    },

    #[error("Group membership already exists: {cause}")]
    GroupMembershipExists { cause: String },

    #[error("Failed to create {entity}: {cause}")]
    CreateEntity { entity: String, cause: String },

    #[error("Failed to update {entity}: {cause}")]
    UpdateEntity { entity: String, cause: String },

    #[error("Failed to remove {entity}: {cause}")]
    RemoveEntity { entity: String, cause: String },

    #[error("Failed to retrieve {entity}: {cause}")]
    RetrieveEntity { entity: String, cause: String },
}

impl CohortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CohortError::NotFound { .. } => ErrorKind::NotFound,
            CohortError::MalformedEntity { .. } => ErrorKind::MalformedEntity,
            CohortError::Conflict { .. } => ErrorKind::Conflict,
            CohortError::GroupNotEmpty { .. } => ErrorKind::GroupNotEmpty,
            CohortError::AlreadyAssigned { kind, .. } => match kind {
                MemberKind::Thing => ErrorKind::ThingAlreadyAssigned,
                MemberKind::Channel => ErrorKind::ChannelAlreadyAssigned,
                MemberKind::Profile => ErrorKind::MemberAlreadyAssigned,
            },
            CohortError::GroupMembershipExists { .. } => ErrorKind::GroupMembershipExists,
            CohortError::CreateEntity { .. } => ErrorKind::CreateEntity,
            CohortError::UpdateEntity { .. } => ErrorKind::UpdateEntity,
            CohortError::RemoveEntity { .. } => ErrorKind::RemoveEntity,
            CohortError::RetrieveEntity { .. } => ErrorKind::RetrieveEntity,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        CohortError::MalformedEntity {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        CohortError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

pub type CohortResult<T> = Result<T, CohortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_assigned_kind_follows_member_kind() {
        let err = |kind| CohortError::AlreadyAssigned {
            kind,
            group_id: "g".into(),
            cause: "duplicate".into(),
        };
        assert_eq!(
            err(MemberKind::Thing).kind(),
            ErrorKind::ThingAlreadyAssigned
        );
        assert_eq!(
            err(MemberKind::Channel).kind(),
            ErrorKind::ChannelAlreadyAssigned
        );
        assert_eq!(
            err(MemberKind::Profile).kind(),
            ErrorKind::MemberAlreadyAssigned
        );
    }

    #[test]
    fn conflict_class() {
        assert!(ErrorKind::Conflict.is_conflict());
        assert!(ErrorKind::GroupMembershipExists.is_conflict());
        assert!(ErrorKind::ThingAlreadyAssigned.is_conflict());
        assert!(!ErrorKind::GroupNotEmpty.is_conflict());
        assert!(!ErrorKind::NotFound.is_conflict());
    }
}
