//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Multi-row mutations are atomic:
//! either every row is written or none is. Dropping a returned future
//! before it completes leaves no partial effect.

use chrono::{DateTime, Utc};

use crate::error::CohortResult;
use crate::models::{
    group::{CreateGroup, Group, UpdateGroup},
    invite::{CreateInvite, Invite, InviteParty},
    membership::{GroupMembership, Role},
    relation::{Affiliation, GroupRelation},
};
use crate::page::{Page, PageRequest};

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub trait GroupRepository: Send + Sync {
    fn save(&self, input: CreateGroup) -> impl Future<Output = CohortResult<Group>> + Send;
    fn update(
        &self,
        id: &str,
        input: UpdateGroup,
    ) -> impl Future<Output = CohortResult<Group>> + Send;
    /// Remove groups atomically. Fails with `GroupNotEmpty` if any of them
    /// is still referenced, in which case none is removed.
    fn remove(&self, ids: &[String]) -> impl Future<Output = CohortResult<()>> + Send;
    fn retrieve_by_id(&self, id: &str) -> impl Future<Output = CohortResult<Group>> + Send;
    fn retrieve_by_ids(
        &self,
        ids: &[String],
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Group>>> + Send;
    fn retrieve_by_owner(
        &self,
        owner_id: &str,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Group>>> + Send;
    fn retrieve_by_org(
        &self,
        org_id: &str,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Group>>> + Send;
    fn retrieve_all(
        &self,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Group>>> + Send;
}

// ---------------------------------------------------------------------------
// Relations (member resources bound to groups)
// ---------------------------------------------------------------------------

/// Binds member resources of one kind to groups.
pub trait RelationRepository: Send + Sync {
    fn assign(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    /// Pairs that do not exist are ignored.
    fn unassign(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    fn retrieve_members_of_group(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<GroupRelation>>> + Send;
    /// Groups the member is assigned to, or with `Affiliation::Unassigned`
    /// the groups it is not assigned to.
    fn retrieve_membership_of(
        &self,
        member_id: &str,
        affiliation: Affiliation,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Group>>> + Send;
    /// The group owning `member_id`, if any.
    fn retrieve_group_of(
        &self,
        member_id: &str,
    ) -> impl Future<Output = CohortResult<Option<String>>> + Send;
    fn backup_all(&self) -> impl Future<Output = CohortResult<Vec<GroupRelation>>> + Send;
    fn backup_by_group(
        &self,
        group_id: &str,
    ) -> impl Future<Output = CohortResult<Vec<GroupRelation>>> + Send;
}

// ---------------------------------------------------------------------------
// Memberships (users bound to groups with a role)
// ---------------------------------------------------------------------------

pub trait MembershipRepository: Send + Sync {
    fn save(
        &self,
        memberships: &[GroupMembership],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    /// Change roles. Fails with `NotFound` if any pair does not exist.
    fn update(
        &self,
        memberships: &[GroupMembership],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    fn remove(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    fn retrieve_role(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> impl Future<Output = CohortResult<Role>> + Send;
    fn retrieve_by_group(
        &self,
        group_id: &str,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<GroupMembership>>> + Send;
    fn retrieve_group_ids_by_member(
        &self,
        member_id: &str,
    ) -> impl Future<Output = CohortResult<Vec<String>>> + Send;
    fn backup_all(&self) -> impl Future<Output = CohortResult<Vec<GroupMembership>>> + Send;
    fn backup_by_group(
        &self,
        group_id: &str,
    ) -> impl Future<Output = CohortResult<Vec<GroupMembership>>> + Send;
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

pub trait InviteRepository: Send + Sync {
    /// Save invites atomically. Invites with an invitee are stored active,
    /// dormant ones pending.
    fn save_invites(
        &self,
        invites: Vec<CreateInvite>,
    ) -> impl Future<Output = CohortResult<Vec<Invite>>> + Send;
    fn retrieve_invite_by_id(&self, id: &str) -> impl Future<Output = CohortResult<Invite>> + Send;
    fn retrieve_invites_by_user(
        &self,
        user_id: &str,
        party: InviteParty,
        page: PageRequest,
    ) -> impl Future<Output = CohortResult<Page<Invite>>> + Send;
    fn remove_invite(&self, id: &str) -> impl Future<Output = CohortResult<()>> + Send;
    /// Delete every invite past its expiry. Returns the number removed.
    fn remove_expired_invites(&self) -> impl Future<Output = CohortResult<u64>> + Send;

    /// Link dormant group invites to an organization invite.
    fn save_dormant_invite_relations(
        &self,
        org_invite_id: &str,
        group_invite_ids: &[String],
    ) -> impl Future<Output = CohortResult<()>> + Send;
    fn retrieve_dormant_invite_relations(
        &self,
        org_invite_id: &str,
    ) -> impl Future<Output = CohortResult<Vec<String>>> + Send;
    /// Bind every invite linked to `org_invite_id` to `user_id`, then drop
    /// the links, in one transaction. Returns the activated invites, which
    /// is empty when nothing was linked.
    fn activate_group_invites(
        &self,
        org_invite_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = CohortResult<Vec<Invite>>> + Send;
}
