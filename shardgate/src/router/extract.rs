//! Sharding conditions: which values each sharding column can take.
//!
//! A WHERE clause yields one condition per OR branch, an INSERT one
//! condition per row. Hinted values replace whatever the statement says
//! about the same column.

use std::collections::HashMap;
use std::ops::Bound;

use tracing::trace;

use super::hint::Hints;
use super::route::GeneratedKeys;
use super::sharding::{Range, ShardingRule, ShardingValue};
use super::statement::{
    ColumnSegment, CompareOp, ExpressionValue, Operator, Statement, StatementKind, Value,
};
use super::Error;

/// Values of sharding columns that hold together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    /// By lowercase (table, column).
    pub values: HashMap<(String, String), ShardingValue>,
    /// No row can match, e.g. `user_id = 1 AND user_id = 2`.
    pub always_false: bool,
    /// INSERT row this condition describes.
    pub row: Option<usize>,
}

impl ShardingCondition {
    /// Column values for one table, by lowercase column.
    pub fn values_of(&self, table: &str) -> HashMap<String, ShardingValue> {
        self.values
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((_, column), value)| (column.clone(), value.clone()))
            .collect()
    }

    fn add(&mut self, table: &str, column: &str, value: ShardingValue) {
        let key = (table.to_string(), column.to_lowercase());
        let value = match self.values.get(&key) {
            Some(existing) => match existing.intersect(&value) {
                Some(value) => value,
                None => {
                    self.always_false = true;
                    return;
                }
            },
            None => value,
        };
        self.values.insert(key, value);
    }
}

/// Extract sharding conditions from a statement.
///
/// An empty list means the statement has nothing to say about any
/// sharding column.
pub fn extract(
    statement: &Statement,
    rule: &ShardingRule,
    hints: &Hints,
    generated: Option<&GeneratedKeys>,
) -> Result<Vec<ShardingCondition>, Error> {
    let mut conditions = match statement.kind {
        StatementKind::Insert => insert_conditions(statement, rule, hints, generated)?,
        _ => where_conditions(statement, rule, hints)?,
    };

    let mut hinted = vec![];
    for table in statement.table_names() {
        if rule.table(&table).is_none() {
            continue;
        }
        for (column, values) in hints.columns_of(&table) {
            hinted.push((table.clone(), column.to_string(), values.to_vec()));
        }
    }

    if !hinted.is_empty() {
        if conditions.is_empty() {
            conditions.push(ShardingCondition::default());
        }
        for condition in &mut conditions {
            for (table, column, values) in &hinted {
                condition.values.insert(
                    (table.clone(), column.clone()),
                    ShardingValue::List(values.clone()),
                );
            }
        }
    }

    trace!("sharding conditions: {:?}", conditions);

    Ok(conditions)
}

fn where_conditions(
    statement: &Statement,
    rule: &ShardingRule,
    hints: &Hints,
) -> Result<Vec<ShardingCondition>, Error> {
    let Some(where_clause) = &statement.where_clause else {
        return Ok(vec![]);
    };

    let mut conditions = vec![];
    for branch in &where_clause.branches {
        let mut condition = ShardingCondition::default();

        for predicate in &branch.predicates {
            let Some(table) = column_table(statement, rule, &predicate.column) else {
                continue;
            };
            if hints.values_of(&table, &predicate.column.name).is_some() {
                continue;
            }
            if let Some(value) = predicate_value(statement, &predicate.operator)? {
                condition.add(&table, &predicate.column.name, value);
            }
        }

        conditions.push(condition);
    }

    Ok(conditions)
}

fn insert_conditions(
    statement: &Statement,
    rule: &ShardingRule,
    hints: &Hints,
    generated: Option<&GeneratedKeys>,
) -> Result<Vec<ShardingCondition>, Error> {
    let table = statement.table_names().into_iter().next();
    let (Some(insert), Some(table)) = (&statement.insert, table) else {
        return Ok(vec![]);
    };
    let Some(table_rule) = rule.table(&table) else {
        return Ok(vec![]);
    };

    let mut conditions = vec![];
    for (index, row) in insert.rows.iter().enumerate() {
        let mut condition = ShardingCondition {
            row: Some(index),
            ..Default::default()
        };

        for (column, expression) in insert.columns.iter().zip(&row.values) {
            if !table_rule.is_sharding_column(&column.name)
                || hints.values_of(&table, &column.name).is_some()
            {
                continue;
            }
            if let Some(value) = resolve(statement, &expression.value)? {
                condition.add(&table, &column.name, ShardingValue::single(value));
            }
        }

        if let Some(generated) = generated {
            if table_rule.is_sharding_column(&generated.column) {
                if let Some(key) = generated.keys.get(index) {
                    condition.add(&table, &generated.column, ShardingValue::single(key.into()));
                }
            }
        }

        conditions.push(condition);
    }

    Ok(conditions)
}

/// Sharded table a column belongs to.
fn column_table(
    statement: &Statement,
    rule: &ShardingRule,
    column: &ColumnSegment,
) -> Option<String> {
    match &column.owner {
        Some(owner) => {
            let table = statement.resolve_owner(owner)?;
            rule.table(&table)?
                .is_sharding_column(&column.name)
                .then_some(table)
        }
        None => statement.table_names().into_iter().find(|table| {
            rule.table(table)
                .is_some_and(|rule| rule.is_sharding_column(&column.name))
        }),
    }
}

fn resolve(statement: &Statement, expression: &ExpressionValue) -> Result<Option<Value>, Error> {
    match expression {
        ExpressionValue::Parameter(index) => statement
            .evaluate(expression)
            .map(Some)
            .ok_or(Error::MissingParameter(*index)),
        _ => Ok(statement.evaluate(expression)),
    }
}

fn predicate_value(
    statement: &Statement,
    operator: &Operator,
) -> Result<Option<ShardingValue>, Error> {
    Ok(match operator {
        Operator::Equal(expression) => {
            resolve(statement, &expression.value)?.map(ShardingValue::single)
        }

        Operator::In(expressions) => {
            let mut values = vec![];
            for expression in expressions {
                match resolve(statement, &expression.value)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            Some(ShardingValue::List(values))
        }

        Operator::Between(low, high) => {
            match (
                resolve(statement, &low.value)?,
                resolve(statement, &high.value)?,
            ) {
                (Some(low), Some(high)) => Some(ShardingValue::Range(Range::closed(low, high))),
                _ => None,
            }
        }

        Operator::Compare(op, expression) => {
            resolve(statement, &expression.value)?.map(|value| {
                let range = match op {
                    CompareOp::Less => Range::new(Bound::Unbounded, Bound::Excluded(value)),
                    CompareOp::LessOrEqual => Range::new(Bound::Unbounded, Bound::Included(value)),
                    CompareOp::Greater => Range::new(Bound::Excluded(value), Bound::Unbounded),
                    CompareOp::GreaterOrEqual => {
                        Range::new(Bound::Included(value), Bound::Unbounded)
                    }
                };
                ShardingValue::Range(range)
            })
        }

        Operator::Other => None,
    })
}
