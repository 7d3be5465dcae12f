//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use surrealdb_types::SurrealValue;

#[derive(Debug, SurrealValue)]
struct Count {
    total: u64,
}

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    cohort_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "groups",
        "group_relation",
        "group_membership",
        "group_invite",
        "group_invite_live",
        "dormant_group_invite",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    cohort_db::run_migrations(&db).await.unwrap();
    cohort_db::run_migrations(&db).await.unwrap();

    let mut result = db
        .query("SELECT count() AS total FROM _migration GROUP ALL")
        .await
        .unwrap();
    let counts: Vec<Count> = result.take(0).unwrap();
    assert_eq!(counts[0].total, cohort_db::schema_ddl().count() as u64);
}

#[tokio::test]
async fn group_name_length_is_enforced() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    cohort_db::run_migrations(&db).await.unwrap();

    let mut result = db
        .query("CREATE groups SET org_id = 'o', owner_id = 'u', name = ''")
        .await
        .unwrap();
    assert!(!result.take_errors().is_empty(), "empty name must be rejected");
}
