//! SurrealDB implementation of [`InviteRepository`].
//!
//! Expiry is never written: rows keep the state they were stored with and
//! readers derive `Expired` from `expires_at`. Dormant invites are linked to
//! an organization invite through `dormant_group_invite` until activation
//! binds them to the accepting user.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use cohort_core::error::{CohortError, CohortResult};
use cohort_core::id::{IdProvider, UuidProvider};
use cohort_core::models::invite::{CreateInvite, Invite, InviteParty, InviteState};
use cohort_core::page::{Page, PageRequest};
use cohort_core::repository::InviteRepository;
use serde_json::{Map, Value};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use super::{ensure_id, ensure_ids};
use crate::error::{DbError, Violation, check};
use crate::query::{QueryFilter, TableSpec, fetch_page, string_array, transaction};

static INVITES: TableSpec = TableSpec {
    table: "group_invite",
    id_expr: "meta::id(id)",
    default_order: "created_at",
    sortable: &["id", "created_at", "expires_at"],
    name_field: None,
    metadata_field: None,
    owner_field: None,
    org_field: None,
};

const INVITE_PROJECTION: &str = "meta::id(id) AS record_id, *";

/// Inserts a batch, refusing a live duplicate of (inviter, invitee, group).
/// Each bound invite claims the `group_invite_live` record keyed on that
/// triple; a claim is only taken over once it has expired, so concurrent
/// saves of the same triple collide on one record. Dormant invites have no
/// invitee and are never duplicates.
const SAVE_INVITES: &str = "\
FOR $inv IN $invites {
    IF array::len((SELECT VALUE id FROM type::record('groups', $inv.group_id))) = 0 {
        THROW 'cohort:missing_group';
    };
    IF $inv.invitee_id != NONE {
        LET $live = type::record('group_invite_live', [$inv.inviter_id, $inv.invitee_id, $inv.group_id]);
        IF array::len((SELECT VALUE id FROM $live WHERE expires_at > time::now())) > 0 {
            THROW 'cohort:duplicate_row';
        };
        UPSERT $live SET invite_id = $inv.id, expires_at = <datetime>$inv.expires_at;
    };
    CREATE type::record('group_invite', $inv.id) SET
        invitee_id = $inv.invitee_id,
        inviter_id = $inv.inviter_id,
        group_id = $inv.group_id,
        invitee_role = $inv.invitee_role,
        expires_at = <datetime>$inv.expires_at,
        state = $inv.state;
};
SELECT meta::id(id) AS record_id, * FROM group_invite WHERE meta::id(id) IN $ids;";

/// Result slot of the saved rows: BEGIN, FOR, SELECT.
const SAVED_ROWS: usize = 2;

const SAVE_DORMANT_LINKS: &str = "\
FOR $group_invite_id IN $group_invite_ids {
    CREATE type::record('dormant_group_invite', [$org_invite_id, $group_invite_id]) SET
        org_invite_id = $org_invite_id, group_invite_id = $group_invite_id;
};";

/// Binds, reads back and unlinks in one transaction. A retry after a
/// successful activation finds no links and touches nothing.
const ACTIVATE_INVITES: &str = "\
LET $targets = (SELECT VALUE type::record('group_invite', group_invite_id)
    FROM dormant_group_invite WHERE org_invite_id = $org_invite_id);
UPDATE $targets SET invitee_id = $user_id, expires_at = $expires_at, state = 'Active';
SELECT meta::id(id) AS record_id, * FROM $targets;
DELETE dormant_group_invite WHERE org_invite_id = $org_invite_id;";

/// Result slot of the activated rows: BEGIN, LET, UPDATE, SELECT.
const ACTIVATED_ROWS: usize = 3;

/// Activation attempts before a write conflict is surfaced.
const ACTIVATION_ATTEMPTS: usize = 3;

const REMOVE_INVITE: &str = "\
DELETE type::record('group_invite', $id) RETURN BEFORE;
DELETE group_invite_live WHERE invite_id = $id;";

/// Result slot of the removed invite: BEGIN, DELETE.
const REMOVED_ROW: usize = 1;

const REMOVE_EXPIRED: &str = "\
DELETE group_invite WHERE expires_at < time::now() RETURN BEFORE;
DELETE group_invite_live WHERE expires_at < time::now();
DELETE dormant_group_invite WHERE group_invite_id NOT IN (SELECT VALUE meta::id(id) FROM group_invite);";

/// Result slot of the expired rows: BEGIN, DELETE.
const EXPIRED_ROWS: usize = 1;

#[derive(Debug, SurrealValue)]
struct InviteRowWithId {
    record_id: String,
    invitee_id: Option<String>,
    inviter_id: String,
    group_id: String,
    invitee_role: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    state: String,
}

impl InviteRowWithId {
    fn try_into_invite(self) -> Result<Invite, DbError> {
        let invalid = |e: CohortError| DbError::InvalidRow(e.to_string());
        let invite = Invite {
            id: self.record_id,
            invitee_id: self.invitee_id,
            inviter_id: self.inviter_id,
            group_id: self.group_id,
            invitee_role: self.invitee_role.parse().map_err(invalid)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            state: self.state.parse().map_err(invalid)?,
        };
        let state = invite.state_at(Utc::now());
        Ok(Invite { state, ..invite })
    }
}

fn ensure_invite(invite: &CreateInvite) -> CohortResult<()> {
    ensure_id("group id", &invite.group_id)?;
    ensure_id("inviter id", &invite.inviter_id)?;
    if let Some(invitee_id) = &invite.invitee_id {
        ensure_id("invitee id", invitee_id)?;
    }
    Ok(())
}

/// Stored state for a new invite: bound invites are live at once.
fn initial_state(invite: &CreateInvite) -> InviteState {
    if invite.invitee_id.is_some() {
        InviteState::Active
    } else {
        InviteState::Pending
    }
}

fn invite_value(id: &str, invite: &CreateInvite) -> Value {
    let mut row = Map::new();
    row.insert("id".into(), Value::from(id));
    // Left out entirely when dormant so the field stays NONE.
    if let Some(invitee_id) = &invite.invitee_id {
        row.insert("invitee_id".into(), Value::from(invitee_id.as_str()));
    }
    row.insert("inviter_id".into(), Value::from(invite.inviter_id.as_str()));
    row.insert("group_id".into(), Value::from(invite.group_id.as_str()));
    row.insert(
        "invitee_role".into(),
        Value::from(invite.invitee_role.as_str()),
    );
    row.insert(
        "expires_at".into(),
        Value::from(invite.expires_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    row.insert("state".into(), Value::from(initial_state(invite).as_str()));
    Value::Object(row)
}

/// SurrealDB implementation of the invite repository.
#[derive(Clone)]
pub struct SurrealInviteRepository<C: Connection> {
    db: Surreal<C>,
    ids: Arc<dyn IdProvider>,
}

impl<C: Connection> SurrealInviteRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_id_provider(db, Arc::new(UuidProvider))
    }

    pub fn with_id_provider(db: Surreal<C>, ids: Arc<dyn IdProvider>) -> Self {
        Self { db, ids }
    }

    async fn insert(&self, ids: Vec<String>, rows: Vec<Value>) -> Result<Vec<Invite>, DbError> {
        let response = self
            .db
            .query(transaction(SAVE_INVITES))
            .bind(("invites", Value::Array(rows)))
            .bind(("ids", string_array(&ids)))
            .await?;

        let mut response = check(response)?;
        let rows: Vec<InviteRowWithId> = response.take(SAVED_ROWS)?;
        let mut invites = rows
            .into_iter()
            .map(InviteRowWithId::try_into_invite)
            .collect::<Result<Vec<_>, _>>()?;

        // Hand the batch back in submission order.
        invites.sort_by_key(|invite| ids.iter().position(|id| *id == invite.id));
        Ok(invites)
    }

    async fn find(&self, id: &str) -> Result<Invite, DbError> {
        let mut response = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('group_invite', $id)")
            .bind(("id", id.to_owned()))
            .await?;

        let rows: Vec<InviteRowWithId> = response.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "invite".into(),
            id: id.to_owned(),
        })?;
        row.try_into_invite()
    }

    async fn delete(&self, id: &str) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(REMOVE_INVITE))
            .bind(("id", id.to_owned()))
            .await?;

        let mut response = check(response)?;
        let removed: Vec<Value> = response.take(REMOVED_ROW)?;
        if removed.is_empty() {
            return Err(DbError::NotFound {
                entity: "invite".into(),
                id: id.to_owned(),
            });
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, DbError> {
        let response = self.db.query(transaction(REMOVE_EXPIRED)).await?;
        let mut response = check(response)?;
        let removed: Vec<Value> = response.take(EXPIRED_ROWS)?;
        Ok(removed.len() as u64)
    }

    async fn link(&self, org_invite_id: &str, group_invite_ids: &[String]) -> Result<(), DbError> {
        let response = self
            .db
            .query(transaction(SAVE_DORMANT_LINKS))
            .bind(("org_invite_id", org_invite_id.to_owned()))
            .bind(("group_invite_ids", string_array(group_invite_ids)))
            .await?;
        check(response)?;
        Ok(())
    }

    async fn find_links(&self, org_invite_id: &str) -> Result<Vec<String>, DbError> {
        let mut response = self
            .db
            .query(
                "SELECT VALUE group_invite_id FROM dormant_group_invite \
                 WHERE org_invite_id = $org_invite_id",
            )
            .bind(("org_invite_id", org_invite_id.to_owned()))
            .await?;
        let mut ids: Vec<String> = response.take(0)?;
        ids.sort();
        Ok(ids)
    }

    async fn activate(
        &self,
        org_invite_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<Invite>, DbError> {
        let response = self
            .db
            .query(transaction(ACTIVATE_INVITES))
            .bind(("org_invite_id", org_invite_id.to_owned()))
            .bind(("user_id", user_id.to_owned()))
            .bind(("expires_at", expires_at))
            .await?;

        let mut response = check(response)?;
        let rows: Vec<InviteRowWithId> = response.take(ACTIVATED_ROWS)?;
        let mut invites = rows
            .into_iter()
            .map(InviteRowWithId::try_into_invite)
            .collect::<Result<Vec<_>, _>>()?;
        invites.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(invites)
    }
}

impl<C: Connection> InviteRepository for SurrealInviteRepository<C> {
    async fn save_invites(&self, invites: Vec<CreateInvite>) -> CohortResult<Vec<Invite>> {
        invites.iter().try_for_each(ensure_invite)?;
        if invites.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(invites.len());
        let mut rows = Vec::with_capacity(invites.len());
        for invite in &invites {
            let id = self.ids.id();
            ensure_id("invite id", &id)?;
            rows.push(invite_value(&id, invite));
            ids.push(id);
        }

        let saved = self
            .insert(ids, rows)
            .await
            .map_err(|e| e.creating("invite"))?;

        info!(count = saved.len(), "Invites saved");
        Ok(saved)
    }

    async fn retrieve_invite_by_id(&self, id: &str) -> CohortResult<Invite> {
        if ensure_id("invite id", id).is_err() {
            return Err(CohortError::not_found("invite", id));
        }
        self.find(id).await.map_err(|e| e.retrieving("invite"))
    }

    async fn retrieve_invites_by_user(
        &self,
        user_id: &str,
        party: InviteParty,
        page: PageRequest,
    ) -> CohortResult<Page<Invite>> {
        ensure_id("user id", user_id)?;
        let predicate = match party {
            InviteParty::Inviter => "inviter_id = $filter.user_id",
            InviteParty::Invitee => "invitee_id = $filter.user_id",
        };
        let filter = QueryFilter::compose(&INVITES, &page)?.and_param(
            predicate,
            "user_id",
            Value::from(user_id),
        );

        fetch_page(
            &self.db,
            &filter,
            INVITE_PROJECTION,
            InviteRowWithId::try_into_invite,
        )
        .await
        .map_err(|e| e.retrieving("invite"))
    }

    async fn remove_invite(&self, id: &str) -> CohortResult<()> {
        if let Err(e) = ensure_id("invite id", id) {
            return Err(CohortError::RemoveEntity {
                entity: "invite".into(),
                cause: e.to_string(),
            });
        }
        self.delete(id).await.map_err(|e| e.removing("invite"))?;

        debug!(invite_id = id, "Invite removed");
        Ok(())
    }

    async fn remove_expired_invites(&self) -> CohortResult<u64> {
        let count = self
            .delete_expired()
            .await
            .map_err(|e| e.removing("invite"))?;

        if count > 0 {
            info!(count, "Expired invites removed");
        }
        Ok(count)
    }

    async fn save_dormant_invite_relations(
        &self,
        org_invite_id: &str,
        group_invite_ids: &[String],
    ) -> CohortResult<()> {
        ensure_id("organization invite id", org_invite_id)?;
        ensure_ids("group invite id", group_invite_ids)?;
        if group_invite_ids.is_empty() {
            return Ok(());
        }

        self.link(org_invite_id, group_invite_ids)
            .await
            .map_err(|e| e.creating("dormant invite"))?;

        debug!(
            org_invite_id,
            count = group_invite_ids.len(),
            "Dormant invites linked"
        );
        Ok(())
    }

    async fn retrieve_dormant_invite_relations(
        &self,
        org_invite_id: &str,
    ) -> CohortResult<Vec<String>> {
        ensure_id("organization invite id", org_invite_id)?;
        self.find_links(org_invite_id)
            .await
            .map_err(|e| e.retrieving("dormant invite"))
    }

    async fn activate_group_invites(
        &self,
        org_invite_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> CohortResult<Vec<Invite>> {
        ensure_id("organization invite id", org_invite_id)?;
        ensure_id("user id", user_id)?;

        // A racing activation of the same links commits first; the retry
        // then finds no links and activates nothing.
        let mut attempt = 1;
        let activated = loop {
            match self.activate(org_invite_id, user_id, expires_at).await {
                Ok(activated) => break activated,
                Err(e)
                    if attempt < ACTIVATION_ATTEMPTS
                        && e.violation() == Violation::TransactionConflict =>
                {
                    debug!(org_invite_id, attempt, error = %e, "Activation conflicted, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.updating("invite")),
            }
        };

        info!(
            org_invite_id,
            user_id,
            count = activated.len(),
            "Dormant group invites activated"
        );
        Ok(activated)
    }
}
