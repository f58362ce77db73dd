//! Statement synthesis through the public builder API.

use frame_db::error::DbError;
use frame_db::models::{Operand, QueryParam, Record, StatementKind};
use frame_db::query::{QueryBuilder, RenderedSql};

fn rows(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new().with("id", i as i64).with("name", format!("user{i}")))
        .collect()
}

#[test]
fn test_select_with_in_and_operator() {
    let mut qb = QueryBuilder::new();
    qb.select("id, name").from("users");
    qb.where_("age", vec![18, 19, 20]).unwrap();
    qb.where_("score >=", 60).unwrap();
    qb.where_("name NOT LIKE", "%bot%").unwrap();

    let plan = qb.build().unwrap();
    assert_eq!(plan.kind, StatementKind::Select);
    let stmt = &plan.statements[0];
    assert_eq!(
        stmt.sql,
        "SELECT `id`,`name` FROM `users` \
         WHERE `age` IN (?,?,?) AND `score` >= ? AND `name` NOT LIKE ?"
    );
    assert_eq!(
        stmt.params,
        vec![
            QueryParam::Int(18),
            QueryParam::Int(19),
            QueryParam::Int(20),
            QueryParam::Int(60),
            QueryParam::from("%bot%"),
        ]
    );
}

#[test]
fn test_select_list_with_aliased_table() {
    let mut qb = QueryBuilder::new();
    qb.select_list(["u.id", "u.name, u.email", "COUNT(o.id) orders"])
        .from_as("users", "u")
        .left_join("orders o", "o.user_id = u.id")
        .group_by("u.id");
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(
        stmt.sql,
        "SELECT `u`.`id`,`u`.`name`,`u`.`email`,COUNT(o.id) orders FROM `users` `u` \
         LEFT JOIN `orders` `o` ON o.user_id = u.id GROUP BY `u`.`id`"
    );
    assert!(stmt.params.is_empty());
}

#[test]
fn test_page_overflow_saturates() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("t").page(i64::MAX).count(10);
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.params, vec![QueryParam::UInt(u64::MAX), QueryParam::UInt(10)]);
}

#[test]
fn test_rejected_condition_does_not_leak_into_next_statement() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("users");
    qb.where_("tenant", 1).unwrap();
    assert!(qb.where_("age BETWEEN", 3).is_err());

    qb.delete("sessions");
    qb.where_("id", 7).unwrap();
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "DELETE FROM `sessions` WHERE `id` = ?");
    assert_eq!(stmt.params, vec![QueryParam::Int(7)]);
}

#[test]
fn test_page_and_count_limit() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("users").order_by("id desc").page(2).count(10);
    let plan = qb.build().unwrap();
    let stmt = &plan.statements[0];
    assert_eq!(stmt.sql, "SELECT * FROM `users` ORDER BY `id` DESC LIMIT ?,?");
    assert_eq!(stmt.params, vec![QueryParam::UInt(10), QueryParam::UInt(10)]);
}

#[test]
fn test_explicit_limit_wins_over_page() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("users").page(3).count(10).limit(5).offset(20);
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "SELECT * FROM `users` LIMIT ?,?");
    assert_eq!(stmt.params, vec![QueryParam::UInt(20), QueryParam::UInt(5)]);
}

#[test]
fn test_or_group() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("t").begin_where_group();
    qb.where_("a", 1).unwrap();
    qb.or_where("b", 2).unwrap();
    qb.end_where_group();
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "SELECT * FROM `t` WHERE (`a` = ? OR `b` = ?)");
    assert_eq!(stmt.params, vec![QueryParam::Int(1), QueryParam::Int(2)]);
}

#[test]
fn test_batch_insert_is_chunked() {
    let mut qb = QueryBuilder::new();
    qb.insert_batch("users", &rows(250));
    let plan = qb.build().unwrap();
    assert_eq!(plan.kind, StatementKind::InsertBatch);
    assert!(plan.captures_insert_id);

    let sizes: Vec<usize> = plan.statements.iter().map(|s| s.params.len() / 2).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    for stmt in &plan.statements {
        assert!(stmt.sql.starts_with("INSERT INTO `users` (`id`,`name`) VALUES (?,?)"));
        assert!(stmt.is_aligned());
    }
}

#[test]
fn test_replace_batch_with_custom_chunk() {
    let mut qb = QueryBuilder::new();
    qb.replace_batch_chunked("users", &rows(7), 3);
    let plan = qb.build().unwrap();
    assert_eq!(plan.statements.len(), 3);
    assert!(plan.statements[0].sql.starts_with("REPLACE INTO"));
    assert!(!plan.captures_insert_id);
}

#[test]
fn test_insert_ignore() {
    let mut qb = QueryBuilder::new();
    qb.insert("users", Record::new().with("email", "a@b.c")).ignore();
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "INSERT IGNORE INTO `users` (`email`) VALUES (?)");
}

#[test]
fn test_update_with_expression_and_limit() {
    let mut qb = QueryBuilder::new();
    qb.update("items", Record::new().with("name", "x"))
        .set_expr("stock = stock - 1")
        .limit(1);
    qb.where_("id", 7).unwrap();
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(
        stmt.sql,
        "UPDATE `items` SET `name` = ?,stock = stock - 1 WHERE `id` = ? LIMIT ?"
    );
    assert_eq!(
        stmt.params,
        vec![QueryParam::from("x"), QueryParam::Int(7), QueryParam::UInt(1)]
    );
}

#[test]
fn test_delete() {
    let mut qb = QueryBuilder::new();
    qb.delete("sessions");
    qb.where_("expires_at <", "2024-01-01").unwrap();
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "DELETE FROM `sessions` WHERE `expires_at` < ?");
}

#[test]
fn test_select_count() {
    let mut qb = QueryBuilder::new();
    qb.select_count("*").from("users");
    qb.where_("status", 1).unwrap();
    let plan = qb.build().unwrap();
    assert_eq!(plan.kind, StatementKind::SelectCount);
    assert_eq!(
        plan.statements[0].sql,
        "SELECT COUNT(*) `total` FROM `users` WHERE `status` = ?"
    );
}

#[test]
fn test_raw_sql_expands_lists() {
    let mut qb = QueryBuilder::new();
    qb.sql(
        "SELECT * FROM t WHERE id IN (?) AND kind = ?",
        vec![Operand::from(vec![1, 2]), Operand::from("a")],
    );
    let stmt = qb.build().unwrap().statements.remove(0);
    assert_eq!(stmt.sql, "SELECT * FROM t WHERE id IN (?,?) AND kind = ?");
    assert_eq!(stmt.params.len(), 3);
}

#[test]
fn test_unsupported_operator() {
    let mut qb = QueryBuilder::new();
    let err = qb.where_("age BETWEEN", 3).unwrap_err();
    assert!(matches!(err, DbError::UnsupportedOperator { .. }));
}

#[test]
fn test_get_sql_renders_literals() {
    let mut qb = QueryBuilder::new();
    qb.select("*").from("users");
    qb.where_("name", "O'Brien").unwrap();
    let rendered = qb.get_sql().unwrap();
    assert_eq!(
        rendered,
        RenderedSql::Single(r#"SELECT * FROM `users` WHERE `name` = 'O\'Brien'"#.to_string())
    );
    // terminal call resets the builder
    assert!(qb.kind().is_none());
}

#[test]
fn test_get_sql_insert_escapes_quotes() {
    let mut qb = QueryBuilder::new();
    qb.insert("t", Record::new().with("name", "O'Brien"));
    assert_eq!(
        qb.get_sql().unwrap().to_string(),
        r#"INSERT INTO `t` (`name`) VALUES ('O\'Brien')"#
    );
}

#[test]
fn test_get_sql_batch() {
    let mut qb = QueryBuilder::new();
    qb.insert_batch_chunked("t", &rows(3), 2);
    match qb.get_sql().unwrap() {
        RenderedSql::Batch(statements) => {
            assert_eq!(statements.len(), 2);
            assert_eq!(
                statements[1],
                "INSERT INTO `t` (`id`,`name`) VALUES (2,'user2')"
            );
        }
        other => panic!("expected batch, got {other:?}"),
    }
}

#[test]
fn test_build_resets_state_even_on_error() {
    let mut qb = QueryBuilder::new();
    qb.select("*").force_master();
    assert!(qb.build().is_err());
    assert!(qb.kind().is_none());
    assert!(!qb.is_force_primary());
}

#[test]
fn test_placeholders_match_params() {
    let mut qb = QueryBuilder::new();
    qb.select("u.id, u.name")
        .from_as("users", "u")
        .join("orders o", "o.user_id = u.id")
        .group_by("u.id")
        .page(4)
        .count(25);
    qb.where_("u.id", vec![1, 2, 3]).unwrap();
    qb.where_("u.deleted_at IS NULL", QueryParam::Null).unwrap();
    qb.where_sql("u.score > ?", vec![10.into()]);
    qb.having("COUNT(o.id) >", 1).unwrap();
    let plan = qb.build().unwrap();
    assert!(plan.statements.iter().all(|s| s.is_aligned()));
}
