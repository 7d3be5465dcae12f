//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! Identifiers are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. Referential integrity between groups
//! and the rows that reference them is enforced by the repositories inside
//! transactions, since SurrealDB has no foreign keys.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::{DbError, check};

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "groups_and_relations",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "invites",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: groups, member relations, memberships
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Groups (organization scope)
-- =======================================================================
DEFINE TABLE groups SCHEMAFULL;
DEFINE FIELD org_id ON TABLE groups TYPE string;
DEFINE FIELD owner_id ON TABLE groups TYPE string;
DEFINE FIELD name ON TABLE groups TYPE string \
    ASSERT string::len($value) > 0 AND string::len($value) <= 1024;
DEFINE FIELD description ON TABLE groups TYPE string DEFAULT '' \
    ASSERT string::len($value) <= 1024;
DEFINE FIELD metadata ON TABLE groups TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE groups TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE groups TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_groups_org_name ON TABLE groups \
    COLUMNS org_id, name UNIQUE;
DEFINE INDEX idx_groups_owner ON TABLE groups COLUMNS owner_id;

-- =======================================================================
-- Member relations (things, channels, profiles bound to groups)
-- =======================================================================
DEFINE TABLE group_relation SCHEMAFULL;
DEFINE FIELD group_id ON TABLE group_relation TYPE string;
DEFINE FIELD member_id ON TABLE group_relation TYPE string;
DEFINE FIELD kind ON TABLE group_relation TYPE string \
    ASSERT $value IN ['thing', 'channel', 'profile'];
DEFINE FIELD created_at ON TABLE group_relation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE group_relation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_group_relation_pair ON TABLE group_relation \
    COLUMNS kind, group_id, member_id UNIQUE;
DEFINE INDEX idx_group_relation_member ON TABLE group_relation \
    COLUMNS kind, member_id;

-- =======================================================================
-- Memberships (users bound to groups with a role)
-- =======================================================================
DEFINE TABLE group_membership SCHEMAFULL;
DEFINE FIELD member_id ON TABLE group_membership TYPE string;
DEFINE FIELD group_id ON TABLE group_membership TYPE string;
DEFINE FIELD role ON TABLE group_membership TYPE string \
    ASSERT $value IN ['admin', 'editor', 'viewer'];
DEFINE FIELD created_at ON TABLE group_membership TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_group_membership_pair ON TABLE group_membership \
    COLUMNS member_id, group_id UNIQUE;
DEFINE INDEX idx_group_membership_group ON TABLE group_membership \
    COLUMNS group_id;
";

// -----------------------------------------------------------------------
// Schema v2: group invites, live invite keys, dormant invite bridge
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
-- =======================================================================
-- Group invites
-- =======================================================================
DEFINE TABLE group_invite SCHEMAFULL;
DEFINE FIELD invitee_id ON TABLE group_invite TYPE option<string>;
DEFINE FIELD inviter_id ON TABLE group_invite TYPE string;
DEFINE FIELD group_id ON TABLE group_invite TYPE string;
DEFINE FIELD invitee_role ON TABLE group_invite TYPE string \
    ASSERT $value IN ['admin', 'editor', 'viewer'];
DEFINE FIELD state ON TABLE group_invite TYPE string \
    ASSERT $value IN ['Pending', 'Active'];
DEFINE FIELD created_at ON TABLE group_invite TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD expires_at ON TABLE group_invite TYPE datetime;
DEFINE INDEX idx_group_invite_group ON TABLE group_invite \
    COLUMNS group_id;
DEFINE INDEX idx_group_invite_inviter ON TABLE group_invite \
    COLUMNS inviter_id;
DEFINE INDEX idx_group_invite_invitee ON TABLE group_invite \
    COLUMNS invitee_id;

-- =======================================================================
-- Live invite keys, one per (inviter, invitee, group)
-- =======================================================================
DEFINE TABLE group_invite_live SCHEMAFULL;
DEFINE FIELD invite_id ON TABLE group_invite_live TYPE string;
DEFINE FIELD expires_at ON TABLE group_invite_live TYPE datetime;
DEFINE INDEX idx_group_invite_live_invite ON TABLE group_invite_live \
    COLUMNS invite_id;

-- =======================================================================
-- Dormant invite bridge (org invite -> group invites)
-- =======================================================================
DEFINE TABLE dormant_group_invite SCHEMAFULL;
DEFINE FIELD org_invite_id ON TABLE dormant_group_invite TYPE string;
DEFINE FIELD group_invite_id ON TABLE dormant_group_invite TYPE string;
DEFINE INDEX idx_dormant_group_invite_pair ON TABLE dormant_group_invite \
    COLUMNS org_invite_id, group_invite_id UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    check(db.query(MIGRATION_TABLE_DDL).await?)
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        check(db.query(migration.sql).await?).map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        check(
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?,
        )
        .map_err(|e| {
            DbError::Migration(format!(
                "Failed to record migration v{}: {}",
                migration.version, e,
            ))
        })?;

        info!(
            version = migration.version,
            "Migration applied successfully"
        );
    }

    Ok(())
}

/// Returns the schema DDL of every migration, in order.
///
/// Exposed for tests that inspect the schema without a database.
pub fn schema_ddl() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|m| m.sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn every_table_is_schemafull() {
        let ddl: String = schema_ddl().collect();
        for table in [
            "groups",
            "group_relation",
            "group_membership",
            "group_invite",
            "group_invite_live",
            "dormant_group_invite",
        ] {
            assert!(
                ddl.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing table {table}"
            );
        }
    }
}
