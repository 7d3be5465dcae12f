//! SurrealDB implementation of [`RelationRepository`].
//!
//! One repository instance serves one [`MemberKind`]. In exclusive mode the
//! record key is `[kind, member_id]`, so the store itself refuses a second
//! group for the same member; shared mode keys on the full triple.

use chrono::{DateTime, Utc};
use cohort_core::error::{CohortError, CohortResult};
use cohort_core::models::group::Group;
use cohort_core::models::relation::{Affiliation, GroupRelation, MemberKind, RelationMode};
use cohort_core::page::{Page, PageRequest};
use cohort_core::repository::RelationRepository;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use super::group::{GROUP_PROJECTION, GROUPS, GroupRowWithId};
use super::{ensure_id, ensure_ids};
use crate::error::{DbError, MISSING_GROUP, Violation, check};
use crate::query::{QueryFilter, TableSpec, fetch_page, string_array, transaction};

static RELATIONS: TableSpec = TableSpec {
    table: "group_relation",
    id_expr: "member_id",
    default_order: "member_id",
    sortable: &["member_id", "created_at", "updated_at"],
    name_field: None,
    metadata_field: None,
    owner_field: None,
    org_field: None,
};

#[derive(Debug, SurrealValue)]
struct RelationRow {
    group_id: String,
    member_id: String,
    kind: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RelationRow {
    fn try_into_relation(self) -> Result<GroupRelation, DbError> {
        let kind = self
            .kind
            .parse()
            .map_err(|e: CohortError| DbError::InvalidRow(e.to_string()))?;
        Ok(GroupRelation {
            group_id: self.group_id,
            member_id: self.member_id,
            kind,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the relation repository for one member kind.
#[derive(Clone)]
pub struct SurrealRelationRepository<C: Connection> {
    db: Surreal<C>,
    kind: MemberKind,
    mode: RelationMode,
}

impl<C: Connection> SurrealRelationRepository<C> {
    /// Repository for `kind` in exclusive mode.
    pub fn new(db: Surreal<C>, kind: MemberKind) -> Self {
        Self::with_mode(db, kind, RelationMode::default())
    }

    pub fn with_mode(db: Surreal<C>, kind: MemberKind, mode: RelationMode) -> Self {
        Self { db, kind, mode }
    }

    fn record_key(&self) -> &'static str {
        match self.mode {
            RelationMode::Exclusive => "[$kind, $member_id]",
            RelationMode::Shared => "[$kind, $group_id, $member_id]",
        }
    }

    async fn insert(&self, group_id: &str, member_ids: &[String]) -> Result<(), DbError> {
        let statements = format!(
            "IF array::len((SELECT VALUE id FROM type::record('groups', $group_id))) = 0 {{
    THROW '{MISSING_GROUP}';
}};
FOR $member_id IN $member_ids {{
    CREATE type::record('group_relation', {key}) SET
        group_id = $group_id, member_id = $member_id, kind = $kind;
}};",
            key = self.record_key()
        );

        let response = self
            .db
            .query(transaction(&statements))
            .bind(("group_id", group_id.to_owned()))
            .bind(("member_ids", string_array(member_ids)))
            .bind(("kind", self.kind.as_str()))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn delete(&self, group_id: &str, member_ids: &[String]) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(
                "DELETE group_relation WHERE kind = $kind \
                 AND group_id = $group_id AND member_id IN $member_ids;",
            ))
            .bind(("group_id", group_id.to_owned()))
            .bind(("member_ids", string_array(member_ids)))
            .bind(("kind", self.kind.as_str()))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn find_group_of(&self, member_id: &str) -> Result<Option<String>, DbError> {
        let mut response = self
            .db
            .query(
                "SELECT VALUE group_id FROM group_relation \
                 WHERE kind = $kind AND member_id = $member_id LIMIT 1",
            )
            .bind(("kind", self.kind.as_str()))
            .bind(("member_id", member_id.to_owned()))
            .await?;
        let group_ids: Vec<String> = response.take(0)?;
        Ok(group_ids.into_iter().next())
    }

    async fn backup(&self, group_id: Option<&str>) -> Result<Vec<GroupRelation>, DbError> {
        let mut query = String::from("SELECT * FROM group_relation WHERE kind = $kind");
        if group_id.is_some() {
            query.push_str(" AND group_id = $group_id");
        }
        query.push_str(" ORDER BY group_id, member_id");

        let mut builder = self.db.query(&query).bind(("kind", self.kind.as_str()));
        if let Some(group_id) = group_id {
            builder = builder.bind(("group_id", group_id.to_owned()));
        }

        let rows: Vec<RelationRow> = builder.await?.take(0)?;
        rows.into_iter().map(RelationRow::try_into_relation).collect()
    }

    fn assigning(&self, err: DbError, group_id: &str) -> CohortError {
        match err.violation() {
            Violation::Unique => CohortError::AlreadyAssigned {
                kind: self.kind,
                group_id: group_id.to_owned(),
                cause: err.to_string(),
            },
            _ => err.creating("relation"),
        }
    }
}

impl<C: Connection> RelationRepository for SurrealRelationRepository<C> {
    async fn assign(&self, group_id: &str, member_ids: &[String]) -> CohortResult<()> {
        ensure_id("group id", group_id)?;
        ensure_ids("member id", member_ids)?;
        if member_ids.is_empty() {
            return Ok(());
        }

        self.insert(group_id, member_ids)
            .await
            .map_err(|e| self.assigning(e, group_id))?;

        info!(
            group_id,
            kind = %self.kind,
            count = member_ids.len(),
            "Members assigned"
        );
        Ok(())
    }

    async fn unassign(&self, group_id: &str, member_ids: &[String]) -> CohortResult<()> {
        ensure_id("group id", group_id)?;
        ensure_ids("member id", member_ids)?;
        if member_ids.is_empty() {
            return Ok(());
        }

        self.delete(group_id, member_ids)
            .await
            .map_err(|e| e.removing("relation"))?;

        info!(
            group_id,
            kind = %self.kind,
            count = member_ids.len(),
            "Members unassigned"
        );
        Ok(())
    }

    async fn retrieve_members_of_group(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> CohortResult<Page<GroupRelation>> {
        ensure_id("group id", group_id)?;
        let filter = QueryFilter::compose(&RELATIONS, &page)?
            .and_param("kind = $filter.kind", "kind", Value::from(self.kind.as_str()))
            .and_param("group_id = $filter.group_id", "group_id", Value::from(group_id));

        fetch_page(&self.db, &filter, "*", RelationRow::try_into_relation)
            .await
            .map_err(|e| e.retrieving("relation"))
    }

    async fn retrieve_membership_of(
        &self,
        member_id: &str,
        affiliation: Affiliation,
        page: PageRequest,
    ) -> CohortResult<Page<Group>> {
        ensure_id("member id", member_id)?;
        let op = match affiliation {
            Affiliation::Assigned => "IN",
            Affiliation::Unassigned => "NOT IN",
        };
        let predicate = format!(
            "meta::id(id) {op} (SELECT VALUE group_id FROM group_relation \
             WHERE kind = $filter.kind AND member_id = $filter.member_id)"
        );
        let filter = QueryFilter::compose(&GROUPS, &page)?
            .and_param(&predicate, "member_id", Value::from(member_id))
            .with_param("kind", Value::from(self.kind.as_str()));

        debug!(member_id, kind = %self.kind, ?affiliation, "Listing member groups");
        fetch_page(
            &self.db,
            &filter,
            GROUP_PROJECTION,
            GroupRowWithId::try_into_group,
        )
        .await
        .map_err(|e| e.retrieving("group"))
    }

    async fn retrieve_group_of(&self, member_id: &str) -> CohortResult<Option<String>> {
        if let Err(e) = ensure_id("member id", member_id) {
            return Err(CohortError::RetrieveEntity {
                entity: "relation".into(),
                cause: e.to_string(),
            });
        }
        self.find_group_of(member_id)
            .await
            .map_err(|e| e.retrieving("relation"))
    }

    async fn backup_all(&self) -> CohortResult<Vec<GroupRelation>> {
        self.backup(None).await.map_err(|e| e.retrieving("relation"))
    }

    async fn backup_by_group(&self, group_id: &str) -> CohortResult<Vec<GroupRelation>> {
        ensure_id("group id", group_id)?;
        self.backup(Some(group_id))
            .await
            .map_err(|e| e.retrieving("relation"))
    }
}
