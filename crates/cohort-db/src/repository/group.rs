//! SurrealDB implementation of [`GroupRepository`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cohort_core::error::{CohortError, CohortResult};
use cohort_core::id::{IdProvider, UuidProvider};
use cohort_core::models::group::{CreateGroup, Group, UpdateGroup};
use cohort_core::models::metadata::Metadata;
use cohort_core::page::{Page, PageRequest};
use cohort_core::repository::GroupRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use super::{ensure_id, ensure_ids};
use crate::error::{DbError, check};
use crate::query::{QueryFilter, TableSpec, fetch_page, string_array, transaction};

pub(crate) static GROUPS: TableSpec = TableSpec {
    table: "groups",
    id_expr: "meta::id(id)",
    default_order: "id",
    sortable: &["id", "name", "created_at", "updated_at"],
    name_field: Some("name"),
    metadata_field: Some("metadata"),
    owner_field: Some("owner_id"),
    org_field: Some("org_id"),
};

pub(crate) const GROUP_PROJECTION: &str = "meta::id(id) AS record_id, *";

/// Refuses to delete a group while anything references it.
const REMOVE_GROUPS: &str = "\
FOR $id IN $ids {
    IF array::len((SELECT VALUE id FROM group_relation WHERE group_id = $id LIMIT 1)) > 0
        OR array::len((SELECT VALUE id FROM group_membership WHERE group_id = $id LIMIT 1)) > 0
        OR array::len((SELECT VALUE id FROM group_invite WHERE group_id = $id LIMIT 1)) > 0 {
        THROW string::concat('cohort:group_not_empty:', $id);
    };
    DELETE type::record('groups', $id);
};";

/// DB-side row struct for queries where the id is already known.
#[derive(Debug, SurrealValue)]
struct GroupRow {
    org_id: String,
    owner_id: String,
    name: String,
    description: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_group(self, id: String) -> Result<Group, DbError> {
        Ok(Group {
            id,
            org_id: self.org_id,
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            metadata: metadata_from(self.metadata)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct GroupRowWithId {
    record_id: String,
    org_id: String,
    owner_id: String,
    name: String,
    description: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRowWithId {
    pub(crate) fn try_into_group(self) -> Result<Group, DbError> {
        Ok(Group {
            id: self.record_id,
            org_id: self.org_id,
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            metadata: metadata_from(self.metadata)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn metadata_from(value: serde_json::Value) -> Result<Metadata, DbError> {
    Metadata::try_from(value).map_err(|e| DbError::InvalidRow(e.to_string()))
}

/// SurrealDB implementation of the Group repository.
#[derive(Clone)]
pub struct SurrealGroupRepository<C: Connection> {
    db: Surreal<C>,
    ids: Arc<dyn IdProvider>,
}

impl<C: Connection> SurrealGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_id_provider(db, Arc::new(UuidProvider))
    }

    pub fn with_id_provider(db: Surreal<C>, ids: Arc<dyn IdProvider>) -> Self {
        Self { db, ids }
    }

    async fn insert(&self, id: String, input: CreateGroup) -> Result<Group, DbError> {
        let metadata = input.metadata.unwrap_or_default().into_value();

        let response = self
            .db
            .query(
                "CREATE type::record('groups', $id) SET \
                 org_id = $org_id, owner_id = $owner_id, \
                 name = $name, description = $description, \
                 metadata = $metadata",
            )
            .bind(("id", id.clone()))
            .bind(("org_id", input.org_id))
            .bind(("owner_id", input.owner_id))
            .bind(("name", input.name))
            .bind(("description", input.description.unwrap_or_default()))
            .bind(("metadata", metadata))
            .await?;

        let mut response = check(response)?;
        let rows: Vec<GroupRow> = response.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id.clone(),
        })?;

        row.into_group(id)
    }

    async fn modify(&self, id: &str, input: UpdateGroup) -> Result<Group, DbError> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.metadata.is_some() {
            sets.push("metadata = $metadata");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('groups', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id.to_owned()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(metadata) = input.metadata {
            builder = builder.bind(("metadata", metadata.into_value()));
        }

        let mut response = check(builder.await?)?;
        let rows: Vec<GroupRow> = response.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id.to_owned(),
        })?;

        row.into_group(id.to_owned())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(REMOVE_GROUPS))
            .bind(("ids", string_array(ids)))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Group, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM type::record('groups', $id)")
            .bind(("id", id.to_owned()))
            .await?;

        let rows: Vec<GroupRow> = response.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "group".into(),
            id: id.to_owned(),
        })?;

        row.into_group(id.to_owned())
    }

    async fn list(&self, page: PageRequest) -> CohortResult<Page<Group>> {
        let filter = QueryFilter::compose(&GROUPS, &page)?;
        fetch_page(
            &self.db,
            &filter,
            GROUP_PROJECTION,
            GroupRowWithId::try_into_group,
        )
        .await
        .map_err(|e| e.retrieving("group"))
    }
}

impl<C: Connection> GroupRepository for SurrealGroupRepository<C> {
    async fn save(&self, input: CreateGroup) -> CohortResult<Group> {
        ensure_id("organization id", &input.org_id)?;
        ensure_id("owner id", &input.owner_id)?;
        let id = self.ids.id();
        ensure_id("group id", &id)?;

        let group = self
            .insert(id, input)
            .await
            .map_err(|e| e.creating("group"))?;

        debug!(group_id = %group.id, org_id = %group.org_id, "Group saved");
        Ok(group)
    }

    async fn update(&self, id: &str, input: UpdateGroup) -> CohortResult<Group> {
        ensure_id("group id", id)?;
        self.modify(id, input)
            .await
            .map_err(|e| e.updating("group"))
    }

    async fn remove(&self, ids: &[String]) -> CohortResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        ensure_ids("group id", ids)?;
        self.delete(ids).await.map_err(|e| e.removing("group"))?;

        info!(count = ids.len(), "Groups removed");
        Ok(())
    }

    async fn retrieve_by_id(&self, id: &str) -> CohortResult<Group> {
        if ensure_id("group id", id).is_err() {
            return Err(CohortError::not_found("group", id));
        }
        self.find(id).await.map_err(|e| e.retrieving("group"))
    }

    async fn retrieve_by_ids(&self, ids: &[String], page: PageRequest) -> CohortResult<Page<Group>> {
        self.list(PageRequest {
            ids: Some(ids.to_vec()),
            ..page
        })
        .await
    }

    async fn retrieve_by_owner(&self, owner_id: &str, page: PageRequest) -> CohortResult<Page<Group>> {
        self.list(PageRequest {
            owner_id: Some(owner_id.to_owned()),
            ..page
        })
        .await
    }

    async fn retrieve_by_org(&self, org_id: &str, page: PageRequest) -> CohortResult<Page<Group>> {
        self.list(PageRequest {
            org_id: Some(org_id.to_owned()),
            ..page
        })
        .await
    }

    async fn retrieve_all(&self, page: PageRequest) -> CohortResult<Page<Group>> {
        self.list(page).await
    }
}
