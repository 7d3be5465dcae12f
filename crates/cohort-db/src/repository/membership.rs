//! SurrealDB implementation of [`MembershipRepository`].

use cohort_core::error::{CohortError, CohortResult};
use cohort_core::models::membership::{GroupMembership, Role};
use cohort_core::page::{Page, PageRequest};
use cohort_core::repository::MembershipRepository;
use serde_json::{Value, json};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use super::{ensure_id, ensure_ids};
use crate::error::{DbError, Violation, check};
use crate::query::{QueryFilter, TableSpec, fetch_page, string_array, transaction};

static MEMBERSHIPS: TableSpec = TableSpec {
    table: "group_membership",
    id_expr: "member_id",
    default_order: "member_id",
    sortable: &["member_id", "role", "created_at"],
    name_field: None,
    metadata_field: None,
    owner_field: None,
    org_field: None,
};

const SAVE_MEMBERSHIPS: &str = "\
FOR $m IN $memberships {
    IF array::len((SELECT VALUE id FROM type::record('groups', $m.group_id))) = 0 {
        THROW 'cohort:missing_group';
    };
    CREATE type::record('group_membership', [$m.member_id, $m.group_id]) SET
        member_id = $m.member_id, group_id = $m.group_id, role = $m.role;
};";

const UPDATE_MEMBERSHIPS: &str = "\
FOR $m IN $memberships {
    LET $updated = UPDATE type::record('group_membership', [$m.member_id, $m.group_id])
        SET role = $m.role RETURN AFTER;
    IF array::len($updated) = 0 {
        THROW string::concat('cohort:missing_row:', $m.member_id);
    };
};";

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    member_id: String,
    group_id: String,
    role: String,
}

impl MembershipRow {
    fn try_into_membership(self) -> Result<GroupMembership, DbError> {
        Ok(GroupMembership {
            member_id: self.member_id,
            group_id: self.group_id,
            role: parse_role(&self.role)?,
        })
    }
}

fn parse_role(role: &str) -> Result<Role, DbError> {
    role.parse()
        .map_err(|e: CohortError| DbError::InvalidRow(e.to_string()))
}

fn ensure_memberships(memberships: &[GroupMembership]) -> CohortResult<()> {
    memberships.iter().try_for_each(|m| {
        ensure_id("member id", &m.member_id)?;
        ensure_id("group id", &m.group_id)
    })
}

fn memberships_value(memberships: &[GroupMembership]) -> Value {
    memberships
        .iter()
        .map(|m| {
            json!({
                "member_id": m.member_id,
                "group_id": m.group_id,
                "role": m.role.as_str(),
            })
        })
        .collect()
}

/// SurrealDB implementation of the membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn run(&self, statements: &str, memberships: &[GroupMembership]) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(statements))
            .bind(("memberships", memberships_value(memberships)))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn delete(&self, group_id: &str, member_ids: &[String]) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(
                "DELETE group_membership WHERE group_id = $group_id \
                 AND member_id IN $member_ids;",
            ))
            .bind(("group_id", group_id.to_owned()))
            .bind(("member_ids", string_array(member_ids)))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn find_role(&self, group_id: &str, member_id: &str) -> Result<Role, DbError> {
        let mut response = self
            .db
            .query("SELECT VALUE role FROM type::record('group_membership', [$member_id, $group_id])")
            .bind(("member_id", member_id.to_owned()))
            .bind(("group_id", group_id.to_owned()))
            .await?;
        let roles: Vec<String> = response.take(0)?;
        let role = roles.first().ok_or_else(|| DbError::NotFound {
            entity: "membership".into(),
            id: format!("{member_id} in {group_id}"),
        })?;
        parse_role(role)
    }

    async fn find_group_ids(&self, member_id: &str) -> Result<Vec<String>, DbError> {
        let mut response = self
            .db
            .query("SELECT VALUE group_id FROM group_membership WHERE member_id = $member_id")
            .bind(("member_id", member_id.to_owned()))
            .await?;
        let mut group_ids: Vec<String> = response.take(0)?;
        group_ids.sort();
        Ok(group_ids)
    }

    async fn backup(&self, group_id: Option<&str>) -> Result<Vec<GroupMembership>, DbError> {
        let query = match group_id {
            Some(_) => "SELECT * FROM group_membership WHERE group_id = $group_id \
                        ORDER BY group_id, member_id",
            None => "SELECT * FROM group_membership ORDER BY group_id, member_id",
        };
        let mut builder = self.db.query(query);
        if let Some(group_id) = group_id {
            builder = builder.bind(("group_id", group_id.to_owned()));
        }

        let rows: Vec<MembershipRow> = builder.await?.take(0)?;
        rows.into_iter()
            .map(MembershipRow::try_into_membership)
            .collect()
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn save(&self, memberships: &[GroupMembership]) -> CohortResult<()> {
        ensure_memberships(memberships)?;
        if memberships.is_empty() {
            return Ok(());
        }

        self.run(SAVE_MEMBERSHIPS, memberships)
            .await
            .map_err(|e| match e.violation() {
                Violation::Unique => CohortError::GroupMembershipExists {
                    cause: e.to_string(),
                },
                _ => e.creating("membership"),
            })?;

        info!(count = memberships.len(), "Memberships saved");
        Ok(())
    }

    async fn update(&self, memberships: &[GroupMembership]) -> CohortResult<()> {
        ensure_memberships(memberships)?;
        if memberships.is_empty() {
            return Ok(());
        }

        self.run(UPDATE_MEMBERSHIPS, memberships)
            .await
            .map_err(|e| e.updating("membership"))?;

        info!(count = memberships.len(), "Memberships updated");
        Ok(())
    }

    async fn remove(&self, group_id: &str, member_ids: &[String]) -> CohortResult<()> {
        ensure_id("group id", group_id)?;
        ensure_ids("member id", member_ids)?;
        if member_ids.is_empty() {
            return Ok(());
        }

        self.delete(group_id, member_ids)
            .await
            .map_err(|e| e.removing("membership"))?;

        info!(group_id, count = member_ids.len(), "Memberships removed");
        Ok(())
    }

    async fn retrieve_role(&self, group_id: &str, member_id: &str) -> CohortResult<Role> {
        if ensure_id("group id", group_id).is_err() || ensure_id("member id", member_id).is_err() {
            return Err(CohortError::not_found(
                "membership",
                format!("{member_id} in {group_id}"),
            ));
        }
        self.find_role(group_id, member_id)
            .await
            .map_err(|e| e.retrieving("membership"))
    }

    async fn retrieve_by_group(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> CohortResult<Page<GroupMembership>> {
        ensure_id("group id", group_id)?;
        let filter = QueryFilter::compose(&MEMBERSHIPS, &page)?.and_param(
            "group_id = $filter.group_id",
            "group_id",
            Value::from(group_id),
        );

        fetch_page(&self.db, &filter, "*", MembershipRow::try_into_membership)
            .await
            .map_err(|e| e.retrieving("membership"))
    }

    async fn retrieve_group_ids_by_member(&self, member_id: &str) -> CohortResult<Vec<String>> {
        ensure_id("member id", member_id)?;
        self.find_group_ids(member_id)
            .await
            .map_err(|e| e.retrieving("membership"))
    }

    async fn backup_all(&self) -> CohortResult<Vec<GroupMembership>> {
        self.backup(None)
            .await
            .map_err(|e| e.retrieving("membership"))
    }

    async fn backup_by_group(&self, group_id: &str) -> CohortResult<Vec<GroupMembership>> {
        ensure_id("group id", group_id)?;
        self.backup(Some(group_id))
            .await
            .map_err(|e| e.retrieving("membership"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MISSING_GROUP, MISSING_ROW};

    #[test]
    fn statements_throw_the_classified_markers() {
        assert!(SAVE_MEMBERSHIPS.contains(MISSING_GROUP));
        assert!(UPDATE_MEMBERSHIPS.contains(MISSING_ROW));
    }

    #[test]
    fn memberships_bind_roles_as_strings() {
        let value = memberships_value(&[GroupMembership {
            member_id: "m".into(),
            group_id: "g".into(),
            role: Role::Editor,
        }]);
        assert_eq!(value[0]["role"], json!("editor"));
    }
}
