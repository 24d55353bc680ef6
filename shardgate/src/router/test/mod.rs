//! Shared fixtures and end-to-end routing and rewriting tests.

use std::collections::HashSet;
use std::sync::Arc;

use shardgate_config::Config;

use super::rewrite::distinct::derived_alias;
use super::statement::*;
use super::*;
use crate::unique_id::{GeneratedKey, KeyGenerators};

pub const USERS: &str = r#"
data_sources = ["ds_0", "ds_1", "shadow_ds_0", "shadow_ds_1"]

[[sharding.tables]]
name = "t_user"
actual_data_nodes = "ds_${0..1}.t_user_${0..3}"
database_strategy = { type = "inline", column = "user_id", expression = "ds_${user_id % 2}" }
table_strategy = { type = "inline", column = "user_id", expression = "t_user_${user_id % 4}" }
key_generator = { column = "id", type = "snowflake", props = { "worker.id" = "1" } }

[shadow]
column = "is_shadow"
mappings = { ds_0 = "shadow_ds_0", ds_1 = "shadow_ds_1" }
"#;

pub const ORDERS: &str = r#"
data_sources = ["ds_0", "ds_1"]

[sharding]
binding_tables = [["t_order", "t_order_item"]]
broadcast_tables = ["t_config"]

[sharding.default_database_strategy]
type = "inline"
column = "user_id"
expression = "ds_${user_id % 2}"

[[sharding.tables]]
name = "t_order"
actual_data_nodes = "ds_${0..1}.t_order_${0..1}"
table_strategy = { type = "inline", column = "order_id", expression = "t_order_${order_id % 2}" }

[[sharding.tables]]
name = "t_order_item"
actual_data_nodes = "ds_${0..1}.t_order_item_${0..1}"
"#;

const UNBOUND: &str = r#"
data_sources = ["ds_0", "ds_1"]

[sharding.default_database_strategy]
type = "inline"
column = "id"
expression = "ds_${id % 2}"

[sharding.default_table_strategy]
type = "standard"
column = "id"
algorithm = { name = "mod", count = 2 }

[[sharding.tables]]
name = "t_a"
actual_data_nodes = "ds_${0..1}.t_a_${0..1}"

[[sharding.tables]]
name = "t_b"
actual_data_nodes = "ds_${0..1}.t_b_${0..1}"
"#;

pub fn config(source: &str) -> Config {
    Config::from_toml(source).unwrap()
}

pub fn rule(source: &str) -> ShardingRule {
    ShardingRule::new(&config(source), &KeyGenerators::new()).unwrap()
}

pub fn router(source: &str) -> Router {
    Router::new(&config(source)).unwrap()
}

pub fn column(name: &str) -> ColumnSegment {
    ColumnSegment::new(name, 0, 0)
}

/// SELECT without text, for tests that only look at predicates.
pub fn select_where(table: &str, branches: Vec<AndPredicate>, parameters: Vec<Value>) -> Statement {
    let mut builder = StatementBuilder::default();
    builder
        .kind(StatementKind::Select)
        .tables(vec![TableSegment::new(table, 0, 0)])
        .parameters(parameters);
    if !branches.is_empty() {
        builder.where_clause(WhereSegment {
            start: 0,
            stop: 0,
            branches,
        });
    }
    builder.build().unwrap()
}

/// Span of the `nth` occurrence of `needle`.
pub fn nth(sql: &str, needle: &str, nth: usize) -> (usize, usize) {
    let (start, _) = sql.match_indices(needle).nth(nth).unwrap();
    (start, start + needle.len() - 1)
}

pub fn at(sql: &str, needle: &str) -> (usize, usize) {
    nth(sql, needle, 0)
}

/// Every occurrence of `name`, aliased as `alias`.
pub fn table(sql: &str, name: &str, alias: Option<&str>) -> Vec<TableSegment> {
    sql.match_indices(name)
        .map(|(start, _)| {
            let table = TableSegment::new(name, start, start + name.len() - 1);
            match alias {
                Some(alias) => table.with_alias(alias),
                None => table,
            }
        })
        .collect()
}

fn expression(text: &str, start: usize, parameter: &mut usize) -> Expression {
    let stop = start + text.len() - 1;
    if text == "?" {
        *parameter += 1;
        Expression::parameter(*parameter - 1, start, stop)
    } else if let Ok(value) = text.parse::<i64>() {
        Expression::literal(value, start, stop)
    } else if text.starts_with('\'') {
        Expression::literal(text.trim_matches('\''), start, stop)
    } else {
        Expression::complex(start, stop)
    }
}

fn column_at(text: &str, start: usize) -> ColumnSegment {
    let stop = start + text.len() - 1;
    match text.split_once('.') {
        Some((owner, name)) => ColumnSegment::new(name, start, stop).with_owner(owner),
        None => ColumnSegment::new(text, start, stop),
    }
}

/// `column = value` or `column IN (values)` as written in `sql`.
/// Parameters are numbered from `parameter`.
pub fn predicate(sql: &str, text: &str, parameter: &mut usize) -> Predicate {
    let (start, stop) = at(sql, text);

    let (column, operator) = if let Some((column, value)) = text.split_once(" = ") {
        let value_start = start + column.len() + 3;
        (column, Operator::Equal(expression(value, value_start, parameter)))
    } else if let Some((column, list)) = text.split_once(" IN (") {
        let mut offset = start + column.len() + 5;
        let mut values = vec![];
        for value in list.trim_end_matches(')').split(", ") {
            values.push(expression(value, offset, parameter));
            offset += value.len() + 2;
        }
        (column, Operator::In(values))
    } else {
        panic!("unsupported predicate: {}", text);
    };

    Predicate {
        column: column_at(column, start),
        operator,
        start,
        stop,
    }
}

/// WHERE clause with one AND branch.
pub fn where_and(sql: &str, predicates: &[&str], parameter: &mut usize) -> WhereSegment {
    let predicates: Vec<Predicate> = predicates
        .iter()
        .map(|text| predicate(sql, text, &mut *parameter))
        .collect();
    WhereSegment {
        start: at(sql, "WHERE").0,
        stop: predicates.iter().map(|p| p.stop).max().unwrap(),
        branches: vec![AndPredicate { predicates }],
    }
}

/// `LIMIT offset,row_count` as written in `sql`.
pub fn limit(sql: &str, parameter: &mut usize) -> PaginationSegment {
    let (_, stop) = at(sql, "LIMIT ");
    let (offset, row_count) = sql[stop + 1..].split_once(',').unwrap();
    let row_count = row_count.trim_start();
    let row_count_start = sql.len() - row_count.len();

    let mut value = |text: &str, start: usize| {
        let expression = expression(text, start, &mut *parameter);
        PaginationValue {
            value: expression.value,
            inclusive: false,
            start: expression.start,
            stop: expression.stop,
        }
    };

    PaginationSegment {
        offset: Some(value(offset, stop + 1)),
        row_count: Some(value(row_count, row_count_start)),
    }
}

/// Positions of `?` markers.
pub fn markers(sql: &str) -> Vec<usize> {
    sql.match_indices('?').map(|(position, _)| position).collect()
}

/// INSERT INTO `name` (columns) VALUES (row), (row)...
pub fn insert(sql: &str, name: &str) -> Statement {
    let (open, _) = at(sql, "(");
    let (close, _) = at(sql, ")");
    let mut columns = vec![];
    let mut offset = open + 1;
    for text in sql[open + 1..close].split(", ") {
        columns.push(column_at(text, offset));
        offset += text.len() + 2;
    }

    let mut parameter = 0;
    let mut rows = vec![];
    let (values, _) = at(sql, "VALUES ");
    let mut cursor = values + "VALUES ".len();
    while let Some(start) = sql[cursor..].find('(').map(|p| p + cursor) {
        let stop = sql[start..].find(')').map(|p| p + start).unwrap();
        let mut offset = start + 1;
        let mut row_values = vec![];
        for text in sql[start + 1..stop].split(", ") {
            row_values.push(expression(text, offset, &mut parameter));
            offset += text.len() + 2;
        }
        rows.push(InsertRow {
            start,
            stop,
            values: row_values,
        });
        cursor = stop;
    }

    StatementBuilder::default()
        .sql(sql)
        .kind(StatementKind::Insert)
        .tables(table(sql, name, None))
        .insert(InsertSegment {
            columns,
            columns_stop: Some(close),
            rows,
        })
        .parameter_markers(markers(sql))
        .build()
        .unwrap()
}

/// SELECT * FROM `name` [WHERE ...] [LIMIT ...]
pub fn select(sql: &str, name: &str, predicates: &[&str], parameters: Vec<Value>) -> Statement {
    let mut parameter = 0;
    let mut builder = StatementBuilder::default();
    builder
        .sql(sql)
        .kind(StatementKind::Select)
        .tables(table(sql, name, None))
        .parameters(parameters)
        .parameter_markers(markers(sql));
    if !predicates.is_empty() {
        builder.where_clause(where_and(sql, predicates, &mut parameter));
    }
    if sql.contains("LIMIT ") {
        builder.select(SelectSegment {
            projections_start: "SELECT ".len(),
            pagination: Some(limit(sql, &mut parameter)),
            ..Default::default()
        });
    }
    builder.build().unwrap()
}

async fn plan(router: &Router, statement: &Statement, hints: &Hints) -> Vec<(String, String)> {
    router
        .plan(statement, hints)
        .await
        .unwrap()
        .into_iter()
        .map(|unit| (unit.data_source, unit.sql))
        .collect()
}

fn units(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(ds, sql)| (ds.to_string(), sql.to_string()))
        .collect()
}

#[tokio::test]
async fn test_route_equality() {
    let router = router(USERS);
    let sql = "SELECT * FROM t_user WHERE user_id = 5";
    let statement = select(sql, "t_user", &["user_id = 5"], vec![]);

    let result = router.route(&statement, &Hints::new()).await.unwrap();
    assert_eq!(
        result.units,
        vec![RoutingUnit {
            data_source: "ds_1".into(),
            tables: vec![TableMapping::new("t_user", "t_user_1")],
            rows: None,
        }]
    );
    assert!(!result.is_cross_shard());

    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[("ds_1", "SELECT * FROM t_user_1 WHERE user_id = 5")])
    );
}

#[tokio::test]
async fn test_route_everywhere() {
    let router = router(USERS);
    let statement = select("SELECT * FROM t_user", "t_user", &[], vec![]);

    let expected: Vec<(String, String)> = ["ds_0", "ds_1"]
        .iter()
        .flat_map(|ds| {
            (0..4).map(move |table| (ds.to_string(), format!("SELECT * FROM t_user_{}", table)))
        })
        .collect();
    assert_eq!(plan(&router, &statement, &Hints::new()).await, expected);
}

#[tokio::test]
async fn test_limit_across_shards() {
    let router = router(USERS);

    let sql = "SELECT * FROM t_user WHERE user_id IN (1, 2) LIMIT 5,10";
    let statement = select(sql, "t_user", &["user_id IN (1, 2)"], vec![]);
    let planned = plan(&router, &statement, &Hints::new()).await;
    assert_eq!(planned.len(), 4);
    for (_, sql) in &planned {
        assert!(sql.ends_with("WHERE user_id IN (1, 2) LIMIT 0,15"), "{}", sql);
    }

    let sql = "SELECT * FROM t_user WHERE user_id = 5 LIMIT 5,10";
    let statement = select(sql, "t_user", &["user_id = 5"], vec![]);
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[("ds_1", "SELECT * FROM t_user_1 WHERE user_id = 5 LIMIT 5,10")])
    );
}

#[tokio::test]
async fn test_rownum_across_shards() {
    let router = router(&format!("{}\n[general]\ndialect = \"oracle\"\n", USERS));
    let sql = "SELECT * FROM (SELECT row_.*, ROWNUM rownum_ FROM (SELECT * FROM t_user) row_ WHERE ROWNUM <= 30) WHERE rownum_ > 10";
    let (offset_start, offset_stop) = at(sql, "10");
    let (row_count_start, row_count_stop) = at(sql, "30");
    let statement = StatementBuilder::default()
        .sql(sql)
        .tables(table(sql, "t_user", None))
        .select(SelectSegment {
            projections_start: "SELECT ".len(),
            pagination: Some(PaginationSegment {
                offset: Some(PaginationValue {
                    value: ExpressionValue::Literal(Value::Integer(10)),
                    inclusive: false,
                    start: offset_start,
                    stop: offset_stop,
                }),
                row_count: Some(PaginationValue {
                    value: ExpressionValue::Literal(Value::Integer(30)),
                    inclusive: true,
                    start: row_count_start,
                    stop: row_count_stop,
                }),
            }),
            ..Default::default()
        })
        .build()
        .unwrap();

    let result = router.route(&statement, &Hints::new()).await.unwrap();
    let pagination = result.pagination.as_ref().unwrap();
    assert_eq!(pagination.offset(), 10);
    assert_eq!(pagination.row_count(), Some(20));

    let planned = plan(&router, &statement, &Hints::new()).await;
    assert_eq!(planned.len(), 8);
    assert_eq!(
        planned[0],
        (
            "ds_0".to_string(),
            "SELECT * FROM (SELECT row_.*, ROWNUM rownum_ FROM (SELECT * FROM t_user_0) row_ WHERE ROWNUM <= 30) WHERE rownum_ > 0".to_string()
        )
    );
    for (_, sql) in &planned {
        assert!(sql.ends_with("WHERE ROWNUM <= 30) WHERE rownum_ > 0"), "{}", sql);
    }
}

#[tokio::test]
async fn test_or_branch_without_value() {
    let router = router(USERS);
    let or_where = |sql: &str, branches: &[&str]| {
        let mut parameter = 0;
        let branches: Vec<AndPredicate> = branches
            .iter()
            .map(|text| AndPredicate {
                predicates: vec![predicate(sql, text, &mut parameter)],
            })
            .collect();
        StatementBuilder::default()
            .sql(sql)
            .tables(table(sql, "t_user", None))
            .where_clause(WhereSegment {
                start: at(sql, "WHERE").0,
                stop: sql.len() - 1,
                branches,
            })
            .build()
            .unwrap()
    };

    let sql = "SELECT * FROM t_user WHERE user_id = 1 OR name = 'a'";
    let statement = or_where(sql, &["user_id = 1", "name = 'a'"]);
    let planned = plan(&router, &statement, &Hints::new()).await;
    assert_eq!(planned.len(), 8);
    for (_, sql) in &planned {
        assert!(sql.ends_with("WHERE user_id = 1 OR name = 'a'"), "{}", sql);
    }

    let sql = "SELECT * FROM t_user WHERE user_id = 1 OR user_id = 2";
    let statement = or_where(sql, &["user_id = 1", "user_id = 2"]);
    let result = router.route(&statement, &Hints::new()).await.unwrap();
    assert_eq!(result.units.len(), 2);
}

#[tokio::test]
async fn test_always_false_routes_to_first_node() {
    let router = router(USERS);
    let sql = "SELECT * FROM t_user WHERE user_id = 1 AND user_id = 2";
    let statement = select(sql, "t_user", &["user_id = 1", "user_id = 2"], vec![]);
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[(
            "ds_0",
            "SELECT * FROM t_user_0 WHERE user_id = 1 AND user_id = 2"
        )])
    );
}

#[tokio::test]
async fn test_text_parameter_routes_like_literal() {
    let router = router(USERS);
    let sql = "SELECT * FROM t_user WHERE user_id = 5 AND user_id = ?";
    let statement = select(
        sql,
        "t_user",
        &["user_id = 5", "user_id = ?"],
        vec![Value::from("5")],
    );
    let units = router.plan(&statement, &Hints::new()).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source, "ds_1");
    assert!(units[0].sql.starts_with("SELECT * FROM t_user_1 "));
}

#[tokio::test]
async fn test_parameterized_limit() {
    let router = router(USERS);
    let sql = "SELECT * FROM t_user WHERE user_id IN (?, ?) LIMIT ?, ?";
    let statement = select(
        sql,
        "t_user",
        &["user_id IN (?, ?)"],
        vec![1i64.into(), 2i64.into(), 5i64.into(), 10i64.into()],
    );

    let units = router.plan(&statement, &Hints::new()).await.unwrap();
    assert_eq!(units.len(), 4);
    for unit in &units {
        assert!(unit.sql.ends_with("LIMIT ?, ?"));
        assert_eq!(
            unit.parameters,
            vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(0),
                Value::Integer(15)
            ]
        );
    }

    let missing = select(sql, "t_user", &["user_id IN (?, ?)"], vec![1i64.into()]);
    assert!(matches!(
        router.route(&missing, &Hints::new()).await,
        Err(Error::MissingParameter(1))
    ));
}

#[tokio::test]
async fn test_shadow_insert() {
    let router = router(USERS);
    let sql = "INSERT INTO t_user (id, is_shadow, name) VALUES (1, 1, 'a')";
    let statement = insert(sql, "t_user");
    let hints = Hints::new().value("t_user", "user_id", 5i64);

    let result = router.route(&statement, &hints).await.unwrap();
    assert!(result.shadow);
    assert!(result.generated_keys.is_none());

    assert_eq!(
        plan(&router, &statement, &hints).await,
        units(&[(
            "shadow_ds_1",
            "INSERT INTO t_user_1 (id, name) VALUES (1, 'a')"
        )])
    );
}

#[tokio::test]
async fn test_shadow_where() {
    let router = router(USERS);
    let hints = Hints::new().value("t_user", "user_id", 5i64);

    let sql = "SELECT * FROM t_user WHERE is_shadow = 1";
    let statement = select(sql, "t_user", &["is_shadow = 1"], vec![]);
    assert_eq!(
        plan(&router, &statement, &hints).await,
        units(&[("shadow_ds_1", "SELECT * FROM t_user_1")])
    );

    // Production traffic loses the column too.
    let sql = "SELECT * FROM t_user WHERE is_shadow = 0 AND name = 'a'";
    let statement = select(sql, "t_user", &["is_shadow = 0", "name = 'a'"], vec![]);
    assert_eq!(
        plan(&router, &statement, &hints).await,
        units(&[("ds_1", "SELECT * FROM t_user_1 WHERE name = 'a'")])
    );

    let sql = "SELECT * FROM t_user WHERE user_id = ? AND is_shadow = ?";
    let statement = select(
        sql,
        "t_user",
        &["user_id = ?", "is_shadow = ?"],
        vec![5i64.into(), 1i64.into()],
    );
    let units = router.plan(&statement, &Hints::new()).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source, "shadow_ds_1");
    assert_eq!(units[0].sql, "SELECT * FROM t_user_1 WHERE user_id = ?");
    assert_eq!(units[0].parameters, vec![Value::Integer(5)]);
}

#[tokio::test]
async fn test_shadow_removal_errors() {
    let router = router(USERS);
    let hints = Hints::new().value("t_user", "user_id", 5i64);

    let sql = "UPDATE t_user SET is_shadow = 1 WHERE user_id = 5";
    let (start, stop) = at(sql, "is_shadow = 1");
    let statement = StatementBuilder::default()
        .sql(sql)
        .kind(StatementKind::Update)
        .tables(table(sql, "t_user", None))
        .assignments(vec![Assignment {
            column: column_at("is_shadow", start),
            value: Expression::literal(1i64, stop, stop),
            start,
            stop,
        }])
        .where_clause(where_and(sql, &["user_id = 5"], &mut 0))
        .build()
        .unwrap();
    assert!(matches!(
        router.plan(&statement, &hints).await,
        Err(Error::Rewrite(rewrite::Error::UnsupportedRemoval(_)))
    ));

    // WHERE segment pointing past the end of the text.
    let sql = "SELECT * FROM t_user WHERE is_shadow = 1";
    let mut statement = select(sql, "t_user", &["is_shadow = 1"], vec![]);
    let result = router.route(&statement, &hints).await.unwrap();
    if let Some(where_clause) = statement.where_clause.as_mut() {
        where_clause.start = sql.len() + 10;
    }
    assert!(matches!(
        router.rewrite(&statement, &result, &result.units[0]),
        Err(Error::Rewrite(rewrite::Error::TokenOutOfBounds { .. }))
    ));
}

#[tokio::test]
async fn test_multi_table_delete_rejected() {
    let router = router(ORDERS);
    let sql = "DELETE t_order, t_order_item FROM t_order JOIN t_order_item ON t_order.order_id = t_order_item.order_id";
    let mut tables = table(sql, "t_order_item", None);
    tables.extend(
        table(sql, "t_order", None)
            .into_iter()
            .filter(|t| !sql[t.start..].starts_with("t_order_item")),
    );
    let statement = StatementBuilder::default()
        .sql(sql)
        .kind(StatementKind::Delete)
        .tables(tables)
        .build()
        .unwrap();

    let err = router.plan(&statement, &Hints::new()).await.unwrap_err();
    assert!(err.is_unsupported(), "{}", err);
}

fn order_join(sql: &str, predicates: &[&str]) -> Statement {
    let mut tables = table(sql, "t_order_item", Some("i"));
    tables.extend(
        table(sql, "t_order", Some("o"))
            .into_iter()
            .filter(|t| !sql[t.start..].starts_with("t_order_item")),
    );
    tables.sort_by_key(|t| t.start);

    StatementBuilder::default()
        .sql(sql)
        .kind(StatementKind::Select)
        .tables(tables)
        .where_clause(where_and(sql, predicates, &mut 0))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_binding_tables() {
    let router = router(ORDERS);
    let sql = "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1 AND o.order_id = 3";
    let statement = order_join(sql, &["o.user_id = 1", "o.order_id = 3"]);

    let result = router.route(&statement, &Hints::new()).await.unwrap();
    assert_eq!(result.units.len(), 1);
    assert_eq!(result.units[0].data_source, "ds_1");
    assert_eq!(result.units[0].actual_table("t_order"), Some("t_order_1"));
    assert_eq!(
        result.units[0].actual_table("T_ORDER_ITEM"),
        Some("t_order_item_1")
    );

    let physical = router
        .rewrite(&statement, &result, &result.units[0])
        .unwrap();
    assert_eq!(
        physical.sql,
        "SELECT * FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id WHERE o.user_id = 1 AND o.order_id = 3"
    );

    let sql = "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1 AND o.order_id = 3 AND i.user_id = 2";
    let statement = order_join(sql, &["o.user_id = 1", "o.order_id = 3", "i.user_id = 2"]);
    assert!(matches!(
        router.route(&statement, &Hints::new()).await,
        Err(Error::InconsistentRouting { .. })
    ));
}

#[tokio::test]
async fn test_cartesian() {
    let router = router(UNBOUND);
    let sql = "SELECT * FROM t_a, t_b WHERE t_a.id = 1";
    let mut tables = table(sql, "t_a", None);
    tables.extend(table(sql, "t_b", None));
    tables.sort_by_key(|t| t.start);
    let statement = StatementBuilder::default()
        .sql(sql)
        .tables(tables)
        .where_clause(where_and(sql, &["t_a.id = 1"], &mut 0))
        .build()
        .unwrap();

    // t_a is pinned to ds_1.t_a_1; t_b has no condition and meets it there.
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[
            ("ds_1", "SELECT * FROM t_a_1, t_b_0 WHERE t_a_1.id = 1"),
            ("ds_1", "SELECT * FROM t_a_1, t_b_1 WHERE t_a_1.id = 1"),
        ])
    );
}

#[tokio::test]
async fn test_broadcast_and_unsharded() {
    let router = router(ORDERS);

    let sql = "SELECT * FROM t_config";
    let statement = select(sql, "t_config", &[], vec![]);
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[("ds_0", sql)])
    );

    let sql = "UPDATE t_config SET value = 1";
    let statement = StatementBuilder::default()
        .sql(sql)
        .kind(StatementKind::Update)
        .tables(table(sql, "t_config", None))
        .build()
        .unwrap();
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[("ds_0", sql), ("ds_1", sql)])
    );

    let sql = "SELECT * FROM t_audit";
    let statement = select(sql, "t_audit", &[], vec![]);
    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[("ds_0", sql)])
    );
}

#[tokio::test]
async fn test_insert_split() {
    let router = router(USERS);
    let sql = "INSERT INTO t_user (id, user_id, name) VALUES (1, 5, 'a'), (2, 6, 'b')";
    let statement = insert(sql, "t_user");

    let result = router.route(&statement, &Hints::new()).await.unwrap();
    assert_eq!(result.units.len(), 2);
    assert_eq!(result.units[0].rows, Some(vec![1]));
    assert_eq!(result.units[1].rows, Some(vec![0]));

    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[
            (
                "ds_0",
                "INSERT INTO t_user_2 (id, user_id, name) VALUES (2, 6, 'b')"
            ),
            (
                "ds_1",
                "INSERT INTO t_user_1 (id, user_id, name) VALUES (1, 5, 'a')"
            ),
        ])
    );
}

#[tokio::test]
async fn test_generated_keys() {
    let router = router(USERS);
    let sql = "INSERT INTO t_user (user_id, name) VALUES (5, 'a'), (9, 'b')";
    let statement = insert(sql, "t_user");

    let result = router.route(&statement, &Hints::new()).await.unwrap();
    let generated = result.generated_keys.clone().unwrap();
    assert_eq!(generated.column, "id");
    assert_eq!(generated.keys.len(), 2);
    assert_ne!(generated.keys[0], generated.keys[1]);

    // 5 and 9 both land on ds_1.t_user_1.
    assert_eq!(result.units.len(), 1);
    let physical = router
        .rewrite(&statement, &result, &result.units[0])
        .unwrap();
    assert_eq!(
        physical.sql,
        format!(
            "INSERT INTO t_user_1 (user_id, name, id) VALUES (5, 'a', {}), (9, 'b', {})",
            generated.keys[0], generated.keys[1]
        )
    );
}

#[tokio::test]
async fn test_distinct_aggregate() {
    let router = router(USERS);
    let sql = "SELECT COUNT(DISTINCT name), COUNT(DISTINCT age) AS ages FROM t_user";
    let (first_start, first_stop) = at(sql, "COUNT(DISTINCT name)");
    let (second_start, second_stop) = at(sql, "COUNT(DISTINCT age)");
    let statement = StatementBuilder::default()
        .sql(sql)
        .tables(table(sql, "t_user", None))
        .select(SelectSegment {
            projections_start: first_start,
            distinct_aggregates: vec![
                DistinctAggregate {
                    argument: "name".into(),
                    alias: None,
                    start: first_start,
                    stop: first_stop,
                },
                DistinctAggregate {
                    argument: "age".into(),
                    alias: Some("ages".into()),
                    start: second_start,
                    stop: second_stop,
                },
            ],
            grouped: true,
            ..Default::default()
        })
        .build()
        .unwrap();

    let planned = plan(&router, &statement, &Hints::new()).await;
    assert_eq!(planned.len(), 8);
    assert_eq!(
        planned[0].1,
        format!(
            "SELECT DISTINCT name AS {}, age AS ages FROM t_user_0",
            derived_alias(0)
        )
    );

    // One unit merges nothing.
    let hints = Hints::new().value("t_user", "user_id", 5i64);
    assert_eq!(
        plan(&router, &statement, &hints).await,
        units(&[(
            "ds_1",
            "SELECT COUNT(DISTINCT name), COUNT(DISTINCT age) AS ages FROM t_user_1"
        )])
    );
}

#[tokio::test]
async fn test_comment_hints() {
    let router = router(USERS);
    let sql = "/* shardgate: t_user.user_id = 6 */ SELECT * FROM t_user";
    let mut statement = select(sql, "t_user", &[], vec![]);
    let (comment_end, _) = at(sql, "*/");
    statement.tables.retain(|table| table.start > comment_end);

    assert_eq!(
        plan(&router, &statement, &Hints::new()).await,
        units(&[(
            "ds_0",
            "/* shardgate: t_user.user_id = 6 */ SELECT * FROM t_user_2"
        )])
    );

    // Explicit hints win.
    let hints = Hints::new().value("t_user", "user_id", 5i64);
    let result = router.route(&statement, &hints).await.unwrap();
    assert_eq!(result.units[0].actual_table("t_user"), Some("t_user_1"));
}

#[tokio::test]
async fn test_reload_keeps_snapshot() {
    let router = router(USERS);
    let statement = select("SELECT * FROM t_user", "t_user", &[], vec![]);
    let before = router.route(&statement, &Hints::new()).await.unwrap();

    let without_shadow = USERS.split("[shadow]").next().unwrap();
    router.reload(&config(without_shadow)).unwrap();

    assert!(before.rule.shadow.is_some());
    assert!(router.rule().shadow.is_none());

    let broken = USERS.replace("ds_${0..1}.t_user", "ds_${0..2}.t_user");
    assert!(matches!(
        router.reload(&config(&broken)),
        Err(Error::Configuration(_))
    ));
    assert!(router.rule().shadow.is_none());
}

#[tokio::test]
async fn test_concurrent_keys() {
    let router = Arc::new(router(USERS));

    let mut handles = vec![];
    for _ in 0..8 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            router.generate_keys("t_user", 250).await.unwrap()
        }));
    }

    let mut keys = HashSet::new();
    for handle in handles {
        for key in handle.await.unwrap() {
            assert!(matches!(key, GeneratedKey::Long(_)));
            assert!(keys.insert(key));
        }
    }
    assert_eq!(keys.len(), 2000);

    assert!(router.generate_key("t_config").await.is_err());
}
