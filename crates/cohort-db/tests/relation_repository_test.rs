//! Integration tests for the Relation repository using in-memory SurrealDB.

use cohort_core::error::ErrorKind;
use cohort_core::models::group::{CreateGroup, Group};
use cohort_core::models::relation::{Affiliation, MemberKind, RelationMode};
use cohort_core::page::PageRequest;
use cohort_core::repository::{GroupRepository, RelationRepository};
use cohort_db::repository::{SurrealGroupRepository, SurrealRelationRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

/// Helper: spin up in-memory DB, run migrations and create `n` groups in
/// one organization.
async fn setup(n: usize) -> (Surreal<Db>, SurrealGroupRepository<Db>, Vec<Group>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    cohort_db::run_migrations(&db).await.unwrap();

    let groups = SurrealGroupRepository::new(db.clone());
    let org_id = new_id();
    let mut created = Vec::new();
    for i in 0..n {
        let group = groups
            .save(CreateGroup {
                org_id: org_id.clone(),
                owner_id: new_id(),
                name: format!("fleet-{}", i + 1),
                description: None,
                metadata: None,
            })
            .await
            .unwrap();
        created.push(group);
    }
    (db, groups, created)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::test]
async fn fleet_scenario() {
    let (db, groups, created) = setup(1).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);
    let a = &created[0];

    let err = groups
        .save(CreateGroup {
            org_id: a.org_id.clone(),
            owner_id: new_id(),
            name: "fleet-1".into(),
            description: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let thing_1 = new_id();
    things.assign(&a.id, &[thing_1.clone()]).await.unwrap();

    let err = groups.remove(&[a.id.clone()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GroupNotEmpty);

    things.unassign(&a.id, &[thing_1]).await.unwrap();
    groups.remove(&[a.id.clone()]).await.unwrap();

    let err = groups.retrieve_by_id(&a.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn double_assign_is_kind_specific_conflict() {
    let (db, _, created) = setup(1).await;
    let group_id = &created[0].id;
    let member_id = new_id();

    for (kind, expected) in [
        (MemberKind::Thing, ErrorKind::ThingAlreadyAssigned),
        (MemberKind::Channel, ErrorKind::ChannelAlreadyAssigned),
        (MemberKind::Profile, ErrorKind::MemberAlreadyAssigned),
    ] {
        let repo = SurrealRelationRepository::new(db.clone(), kind);
        repo.assign(group_id, &[member_id.clone()]).await.unwrap();

        let err = repo
            .assign(group_id, &[member_id.clone()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), expected);
        assert!(err.kind().is_conflict());

        let members = repo
            .retrieve_members_of_group(group_id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(members.total, 1);
        assert_eq!(members.items[0].member_id, member_id);
        assert_eq!(members.items[0].kind, kind);
    }
}

#[tokio::test]
async fn assign_is_all_or_nothing() {
    let (db, _, created) = setup(1).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);
    let group_id = &created[0].id;

    let taken = new_id();
    things.assign(group_id, &[taken.clone()]).await.unwrap();

    let fresh = new_id();
    let err = things
        .assign(group_id, &[fresh.clone(), taken])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThingAlreadyAssigned);
    assert_eq!(things.retrieve_group_of(&fresh).await.unwrap(), None);
}

#[tokio::test]
async fn assign_errors() {
    let (db, _, created) = setup(1).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);

    let err = things.assign(&new_id(), &[new_id()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = things
        .assign(&created[0].id, &["thing-1".to_owned()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEntity);

    let err = things.assign("", &[new_id()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEntity);
}

#[tokio::test]
async fn exclusive_mode_allows_one_group_per_member() {
    let (db, _, created) = setup(2).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);
    let member_id = new_id();

    things.assign(&created[0].id, &[member_id.clone()]).await.unwrap();
    let err = things
        .assign(&created[1].id, &[member_id.clone()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ThingAlreadyAssigned);

    assert_eq!(
        things.retrieve_group_of(&member_id).await.unwrap(),
        Some(created[0].id.clone())
    );
}

#[tokio::test]
async fn shared_mode_allows_many_groups() {
    let (db, _, created) = setup(3).await;
    let channels =
        SurrealRelationRepository::with_mode(db, MemberKind::Channel, RelationMode::Shared);
    let member_id = new_id();

    channels
        .assign(&created[0].id, &[member_id.clone()])
        .await
        .unwrap();
    channels
        .assign(&created[1].id, &[member_id.clone()])
        .await
        .unwrap();

    let assigned = channels
        .retrieve_membership_of(&member_id, Affiliation::Assigned, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(assigned.total, 2);
    let mut ids: Vec<_> = assigned.items.into_iter().map(|g| g.id).collect();
    ids.sort();
    let mut expected = vec![created[0].id.clone(), created[1].id.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    let unassigned = channels
        .retrieve_membership_of(
            &member_id,
            Affiliation::Unassigned,
            PageRequest {
                org_id: Some(created[0].org_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unassigned.total, 1);
    assert_eq!(unassigned.items[0].id, created[2].id);
}

#[tokio::test]
async fn kinds_are_isolated() {
    let (db, _, created) = setup(1).await;
    let things = SurrealRelationRepository::new(db.clone(), MemberKind::Thing);
    let channels = SurrealRelationRepository::new(db, MemberKind::Channel);
    let member_id = new_id();

    things.assign(&created[0].id, &[member_id.clone()]).await.unwrap();

    assert_eq!(channels.retrieve_group_of(&member_id).await.unwrap(), None);
    let page = channels
        .retrieve_members_of_group(&created[0].id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn unassign_of_absent_pair_is_noop() {
    let (db, _, created) = setup(1).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);

    things
        .unassign(&created[0].id, &[new_id(), new_id()])
        .await
        .unwrap();
    things.unassign(&created[0].id, &[]).await.unwrap();
}

#[tokio::test]
async fn group_of_malformed_member_is_retrieve_error() {
    let (db, _, _) = setup(0).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);

    let err = things.retrieve_group_of("not an id").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetrieveEntity);
    assert_eq!(things.retrieve_group_of(&new_id()).await.unwrap(), None);
}

#[tokio::test]
async fn members_of_group_paginate_and_backup() {
    let (db, _, created) = setup(2).await;
    let things = SurrealRelationRepository::new(db, MemberKind::Thing);

    let mut members: Vec<String> = (0..4).map(|_| new_id()).collect();
    things.assign(&created[0].id, &members).await.unwrap();
    things.assign(&created[1].id, &[new_id()]).await.unwrap();
    members.sort();

    let page = things
        .retrieve_members_of_group(&created[0].id, PageRequest::with_limit(2, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(
        page.items.iter().map(|r| r.member_id.clone()).collect::<Vec<_>>(),
        members[1..3]
    );

    let err = things
        .retrieve_members_of_group(
            &created[0].id,
            PageRequest {
                name: Some("x".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedEntity);

    assert_eq!(things.backup_all().await.unwrap().len(), 5);
    let backup = things.backup_by_group(&created[0].id).await.unwrap();
    assert_eq!(backup.len(), 4);
    assert!(backup.iter().all(|r| r.group_id == created[0].id));
}
