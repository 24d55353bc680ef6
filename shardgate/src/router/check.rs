//! Reject statements that can't be split across shards.
//!
//! Runs before anything else looks at the statement.

use super::sharding::ShardingRule;
use super::statement::{Operator, Statement, StatementKind};
use super::Error;

pub fn check(statement: &Statement, rule: &ShardingRule) -> Result<(), Error> {
    let sharded: Vec<String> = statement
        .table_names()
        .into_iter()
        .filter(|table| rule.table(table).is_some())
        .collect();

    match statement.kind {
        StatementKind::Delete | StatementKind::Update => {
            if sharded.len() > 1 {
                return Err(Error::unsupported(format!(
                    "multi-table {} on sharded tables {:?}",
                    if statement.kind == StatementKind::Delete {
                        "DELETE"
                    } else {
                        "UPDATE"
                    },
                    sharded
                )));
            }
            if statement.kind == StatementKind::Update {
                check_sharding_key_update(statement, rule)?;
            }
        }

        StatementKind::Copy | StatementKind::LoadData | StatementKind::LoadXml => {
            if let Some(table) = sharded.first() {
                return Err(Error::unsupported(format!(
                    "bulk load into sharded table \"{}\"",
                    table
                )));
            }
        }

        StatementKind::Insert => {
            if let (Some(table), Some(insert)) = (sharded.first(), &statement.insert) {
                if insert.rows.is_empty() {
                    return Err(Error::unsupported(format!(
                        "INSERT without VALUES into sharded table \"{}\"",
                        table
                    )));
                }
                if !insert.columns.is_empty()
                    && insert
                        .rows
                        .iter()
                        .any(|row| row.values.len() != insert.columns.len())
                {
                    return Err(Error::unsupported("INSERT rows don't match the column list"));
                }
            }
        }

        StatementKind::Select | StatementKind::Other => (),
    }

    check_shadow(statement, rule)
}

/// Changing a sharding column would move the row to another shard.
/// Only allowed when the new value is the one the WHERE clause pins.
fn check_sharding_key_update(statement: &Statement, rule: &ShardingRule) -> Result<(), Error> {
    let Some(table) = statement.table_names().into_iter().next() else {
        return Ok(());
    };
    let Some(table_rule) = rule.table(&table) else {
        return Ok(());
    };

    for assignment in &statement.assignments {
        if !table_rule.is_sharding_column(&assignment.column.name) {
            continue;
        }

        let new_value = statement.evaluate(&assignment.value.value);
        let pinned = statement.where_clause.as_ref().and_then(|where_clause| {
            let [branch] = where_clause.branches.as_slice() else {
                return None;
            };
            branch.predicates.iter().find_map(|predicate| {
                match &predicate.operator {
                    Operator::Equal(expression)
                        if predicate
                            .column
                            .name
                            .eq_ignore_ascii_case(&assignment.column.name) =>
                    {
                        statement.evaluate(&expression.value)
                    }
                    _ => None,
                }
            })
        });

        match (new_value, pinned) {
            (Some(new_value), Some(pinned)) if new_value == pinned => (),
            _ => {
                return Err(Error::unsupported(format!(
                    "UPDATE of sharding column \"{}\"",
                    assignment.column.name
                )))
            }
        }
    }

    Ok(())
}

/// The shadow column is stripped from the statement. Inside an OR that
/// would change what the statement means.
fn check_shadow(statement: &Statement, rule: &ShardingRule) -> Result<(), Error> {
    let Some(column) = rule.shadow_column() else {
        return Ok(());
    };
    let Some(where_clause) = &statement.where_clause else {
        return Ok(());
    };

    if where_clause.branches.len() > 1
        && where_clause
            .branches
            .iter()
            .flat_map(|branch| &branch.predicates)
            .any(|predicate| predicate.column.name.eq_ignore_ascii_case(column))
    {
        return Err(Error::unsupported(format!(
            "shadow column \"{}\" inside OR",
            column
        )));
    }

    Ok(())
}
