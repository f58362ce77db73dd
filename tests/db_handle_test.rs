//! `Db` handle behavior that needs no reachable server: rendering,
//! routing refusals, transaction no-ops and hook dispatch on failure.

use frame_db::config::{GroupConfig, HostConfig, ReplicaPolicy, StaticConfigProvider};
use frame_db::db::{ConnectionRegistry, Filter, HookRegistry, JsonRow, Table, TableDescriptor};
use frame_db::error::DbError;
use frame_db::models::Record;
use frame_db::query::RenderedSql;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn unreachable_host() -> HostConfig {
    HostConfig::from_url(
        "mysql://root@unreachable.invalid/app?connect_lazily=true&acquire_timeout=1",
    )
    .unwrap()
}

fn registry(policy: ReplicaPolicy, hooks: Arc<HookRegistry>) -> ConnectionRegistry {
    let group = GroupConfig::new(unreachable_host()).with_replica_policy(policy);
    let provider = StaticConfigProvider::new().with_group("db/main", group);
    ConnectionRegistry::with_hooks(Arc::new(provider), hooks)
}

#[tokio::test]
async fn test_get_sql_through_handle() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    db.select("id").from("users").where_("id", vec![1, 2]).unwrap();
    assert_eq!(
        db.get_sql().unwrap(),
        RenderedSql::Single("SELECT `id` FROM `users` WHERE `id` IN (1,2)".to_string())
    );
    assert!(db.builder().kind().is_none());
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_read_without_replica_fails_under_fail_policy() {
    let registry = registry(ReplicaPolicy::Fail, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    db.select("*").from("users");
    let err = db.fetch_all::<JsonRow>().await.unwrap_err();
    assert!(matches!(err, DbError::NoReplicaAvailable { .. }));
    // the failed terminal call still resets the builder
    assert!(db.builder().kind().is_none());
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_commit_and_rollback_outside_transaction_are_noops() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    db.commit_trans().await.unwrap();
    db.rollback_trans().await.unwrap();
    assert_eq!(db.transaction_depth(), 0);
    assert!(!db.in_transaction());
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_failed_begin_leaves_no_transaction() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    assert!(db.begin_trans().await.is_err());
    assert_eq!(db.transaction_depth(), 0);
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_error_hook_sees_failed_statement() {
    let hooks = Arc::new(HookRegistry::new());
    let before = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let before = Arc::clone(&before);
        hooks.set_before(move |_| {
            before.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&seen);
        hooks.set_error(move |event, _err| {
            seen.lock().unwrap().push(event.rendered_sql());
        });
    }

    let registry = registry(ReplicaPolicy::Primary, Arc::clone(&hooks));
    let mut db = registry.db("db/main").await.unwrap();
    db.insert("users", Record::new().with("name", "ann"));
    assert!(db.exec().await.is_err());

    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        ["INSERT INTO `users` (`name`) VALUES ('ann')".to_string()]
    );
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_forwarded_select_list_and_alias() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    db.select_list(["u.id", "u.name"]).from_as("users", "u").limit(5);
    assert_eq!(
        db.get_sql().unwrap().to_string(),
        "SELECT `u`.`id`,`u`.`name` FROM `users` `u` LIMIT 5"
    );
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_rejected_filter_resets_handle() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    let filter = Filter::new().with("status", 1).with("age BETWEEN", 3);
    {
        let mut table = Table::new(&mut db, TableDescriptor::new("users"));
        let err = table.load_all::<JsonRow>(&filter, "id").await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperator { .. }));
    }
    assert!(db.builder().kind().is_none());

    db.delete("sessions").where_("id", 7).unwrap();
    assert_eq!(
        db.get_sql().unwrap().to_string(),
        "DELETE FROM `sessions` WHERE `id` = 7"
    );
    registry.shutdown(&[]).await;
}

#[tokio::test]
async fn test_table_helper_renders_pending_clauses() {
    let registry = registry(ReplicaPolicy::Primary, Arc::new(HookRegistry::new()));
    let mut db = registry.db("db/main").await.unwrap();
    let mut table = Table::new(&mut db, TableDescriptor::new("users"));
    assert_eq!(table.descriptor().primary_key, "id");
    table.db().select("*").from("users").limit(1);
    assert_eq!(
        table.db().get_sql().unwrap().to_string(),
        "SELECT * FROM `users` LIMIT 1"
    );
    registry.shutdown(&[]).await;
}
