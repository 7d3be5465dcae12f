//! Database-specific error types and conversions.
//!
//! Raw SurrealDB failures are classified into a [`Violation`] here; the
//! repositories turn that into the domain [`CohortError`] for the
//! operation at hand.

use cohort_core::error::CohortError;
use surrealdb::IndexedResults;

/// Marker thrown when a referenced group does not exist.
pub(crate) const MISSING_GROUP: &str = "cohort:missing_group";
/// Marker thrown when a group to delete is still referenced.
pub(crate) const GROUP_NOT_EMPTY: &str = "cohort:group_not_empty";
/// Marker thrown when a row to update does not exist.
pub(crate) const MISSING_ROW: &str = "cohort:missing_row";
/// Marker thrown when a live duplicate is found by a guarded insert.
pub(crate) const DUPLICATE_ROW: &str = "cohort:duplicate_row";

const CANCELLED_TRANSACTION: &str = "failed transaction";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// What kind of integrity rule a failed statement broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violation {
    /// Record identity or unique index collision.
    Unique,
    /// A referenced group does not exist.
    Reference,
    /// Field type or assertion failure.
    Constraint,
    /// The group is still referenced; carries the group id.
    NotEmpty(String),
    /// A row expected to exist does not; carries the row key.
    Missing(String),
    /// A concurrent transaction wrote the same keys first.
    TransactionConflict,
    Other,
}

impl DbError {
    pub(crate) fn violation(&self) -> Violation {
        let message = match self {
            DbError::Surreal(e) => e.to_string(),
            DbError::Statement(message) => message.clone(),
            _ => return Violation::Other,
        };

        if let Some(id) = thrown(&message, GROUP_NOT_EMPTY) {
            return Violation::NotEmpty(id);
        }
        if let Some(key) = thrown(&message, MISSING_ROW) {
            return Violation::Missing(key);
        }
        if message.contains(MISSING_GROUP) {
            return Violation::Reference;
        }
        if message.contains(DUPLICATE_ROW)
            || message.contains("already exists")
            || message.contains("already contains")
        {
            return Violation::Unique;
        }
        let lower = message.to_lowercase();
        if lower.contains("transaction conflict")
            || lower.contains("write conflict")
            || lower.contains("retry the transaction")
            || lower.contains("can be retried")
        {
            return Violation::TransactionConflict;
        }
        if lower.contains("must conform to")
            || lower.contains("expected a")
            || lower.contains("couldn't coerce")
            || lower.contains("invalid datetime")
        {
            return Violation::Constraint;
        }
        Violation::Other
    }

    /// Translate a failed insert.
    pub(crate) fn creating(self, entity: &str) -> CohortError {
        match self.violation() {
            Violation::Unique => CohortError::Conflict {
                reason: format!("{entity} already exists: {self}"),
            },
            Violation::Reference => CohortError::Conflict {
                reason: format!("{entity} references a missing group"),
            },
            Violation::TransactionConflict => CohortError::Conflict {
                reason: format!("{entity} was written concurrently: {self}"),
            },
            Violation::Constraint => CohortError::malformed(self.to_string()),
            _ => CohortError::CreateEntity {
                entity: entity.into(),
                cause: self.to_string(),
            },
        }
    }

    /// Translate a failed update.
    pub(crate) fn updating(self, entity: &str) -> CohortError {
        match self.violation() {
            Violation::Unique => CohortError::Conflict {
                reason: format!("{entity} already exists: {self}"),
            },
            Violation::Constraint => CohortError::malformed(self.to_string()),
            Violation::Missing(key) => CohortError::not_found(entity, key),
            _ => match self {
                DbError::NotFound { entity, id } => CohortError::UpdateEntity {
                    cause: format!("no {entity} with id {id}"),
                    entity,
                },
                other => CohortError::UpdateEntity {
                    entity: entity.into(),
                    cause: other.to_string(),
                },
            },
        }
    }

    /// Translate a failed delete.
    pub(crate) fn removing(self, entity: &str) -> CohortError {
        match self.violation() {
            Violation::NotEmpty(group_id) => CohortError::GroupNotEmpty { group_id },
            _ => CohortError::RemoveEntity {
                entity: entity.into(),
                cause: self.to_string(),
            },
        }
    }

    /// Translate a failed read. Missing rows stay `NotFound`.
    pub(crate) fn retrieving(self, entity: &str) -> CohortError {
        match self {
            DbError::NotFound { entity, id } => CohortError::NotFound { entity, id },
            other => CohortError::RetrieveEntity {
                entity: entity.into(),
                cause: other.to_string(),
            },
        }
    }
}

impl From<DbError> for CohortError {
    fn from(err: DbError) -> Self {
        err.retrieving("record")
    }
}

/// Surface statement-level failures of a response.
///
/// When a transaction fails, every statement in it reports an error; the
/// statement that caused the failure is preferred over the cancellation
/// notices of its siblings.
pub(crate) fn check(mut response: IndexedResults) -> Result<IndexedResults, DbError> {
    let mut errors: Vec<(usize, String)> = response
        .take_errors()
        .into_iter()
        .map(|(index, err)| (index, err.to_string()))
        .collect();
    if errors.is_empty() {
        return Ok(response);
    }
    errors.sort_by_key(|(index, _)| *index);

    let cause = errors
        .iter()
        .find(|(_, message)| !message.contains(CANCELLED_TRANSACTION))
        .map(|(_, message)| message.clone())
        .unwrap_or_else(|| {
            errors
                .iter()
                .map(|(_, message)| message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        });
    Err(DbError::Statement(cause))
}

/// Extract the value thrown after `marker:` in a statement error.
fn thrown(message: &str, marker: &str) -> Option<String> {
    let start = message.find(marker)? + marker.len();
    let rest = message[start..].strip_prefix(':')?;
    let value: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    Some(value)
}

#[cfg(test)]
mod tests {
    use cohort_core::error::ErrorKind;

    use super::*;

    fn statement(message: &str) -> DbError {
        DbError::Statement(message.into())
    }

    #[test]
    fn unique_index_collision_is_conflict() {
        let err = statement(
            "Database index `idx_groups_org_name` already contains ['org', 'fleet-1'], \
             with record `groups:abc`",
        );
        assert_eq!(err.violation(), Violation::Unique);
        assert_eq!(err.creating("group").kind(), ErrorKind::Conflict);
    }

    #[test]
    fn field_assertion_is_malformed() {
        let err = statement(
            "Found '' for field `name`, with record `groups:abc`, \
             but field must conform to: string::len($value) > 0",
        );
        assert_eq!(err.creating("group").kind(), ErrorKind::MalformedEntity);
    }

    #[test]
    fn thrown_markers_are_classified() {
        let err = statement("An error occurred: cohort:group_not_empty:5f1c-42");
        assert_eq!(err.violation(), Violation::NotEmpty("5f1c-42".into()));
        assert_eq!(err.removing("group").kind(), ErrorKind::GroupNotEmpty);

        let err = statement("An error occurred: cohort:missing_row:user-1");
        assert_eq!(err.updating("membership").kind(), ErrorKind::NotFound);

        let err = statement("An error occurred: cohort:missing_group");
        assert_eq!(err.creating("relation").kind(), ErrorKind::Conflict);
    }

    #[test]
    fn write_conflicts_are_classified() {
        let err = statement(
            "Failed to commit transaction due to a read or write conflict. \
             This transaction can be retried",
        );
        assert_eq!(err.violation(), Violation::TransactionConflict);

        let err = statement("Transaction conflict: Write conflict, retry the transaction");
        assert_eq!(err.violation(), Violation::TransactionConflict);
        assert_eq!(err.creating("invite").kind(), ErrorKind::Conflict);

        let err = statement("Transaction conflict: Write conflict, retry the transaction");
        assert_eq!(err.updating("invite").kind(), ErrorKind::UpdateEntity);
    }

    #[test]
    fn unclassified_failures_keep_operation_kind() {
        let err = statement("connection reset");
        assert_eq!(err.violation(), Violation::Other);
        assert_eq!(
            statement("connection reset").creating("group").kind(),
            ErrorKind::CreateEntity
        );
        assert_eq!(err.removing("invite").kind(), ErrorKind::RemoveEntity);
    }

    #[test]
    fn missing_update_target_is_update_entity() {
        let err = DbError::NotFound {
            entity: "group".into(),
            id: "g".into(),
        };
        assert_eq!(err.updating("group").kind(), ErrorKind::UpdateEntity);
    }
}
