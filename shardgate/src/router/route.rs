//! Routing: from sharding conditions to data nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::extract::ShardingCondition;
use super::hint::Hints;
use super::pagination::PaginationContext;
use super::sharding::{Input, ShardingRule, TableRule};
use super::statement::{Operator, Statement, StatementKind};
use super::Error;
use crate::unique_id::GeneratedKey;

/// Keys generated for an INSERT that left the key column out, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeys {
    pub column: String,
    pub keys: Vec<GeneratedKey>,
}

/// Logical table renamed in a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub logic_table: String,
    pub actual_table: String,
}

impl TableMapping {
    pub fn new(logic_table: &str, actual_table: &str) -> Self {
        Self {
            logic_table: logic_table.to_string(),
            actual_table: actual_table.to_string(),
        }
    }
}

/// One physical statement target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingUnit {
    pub data_source: String,
    pub tables: Vec<TableMapping>,
    /// INSERT rows that go here. `None` for everything else.
    pub rows: Option<Vec<usize>>,
}

impl RoutingUnit {
    pub fn new(data_source: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            tables: vec![],
            rows: None,
        }
    }

    /// Actual table standing in for `logic_table`.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|mapping| mapping.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|mapping| mapping.actual_table.as_str())
    }
}

/// Where a statement goes and what the rewriter needs to know about it.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub units: Vec<RoutingUnit>,
    pub pagination: Option<PaginationContext>,
    pub generated_keys: Option<GeneratedKeys>,
    pub shadow: bool,
    /// Rule snapshot the statement was routed with.
    pub rule: Arc<ShardingRule>,
}

impl RoutingResult {
    /// More than one unit: results need merging.
    pub fn is_cross_shard(&self) -> bool {
        self.units.len() > 1
    }
}

/// Data nodes of one binding group (or a lone table) and the INSERT
/// rows each one receives.
#[derive(Debug)]
struct Routed<'a> {
    rule: &'a TableRule,
    /// Positions in `rule.data_nodes`, ascending.
    nodes: Vec<usize>,
    rows: BTreeMap<usize, Vec<usize>>,
    /// Some condition or hint constrained this table.
    constrained: bool,
}

#[derive(Debug, Clone)]
struct Target {
    data_source: String,
    tables: Vec<TableMapping>,
    rows: Option<Vec<usize>>,
}

/// Route a statement to its units.
pub fn route(
    statement: &Statement,
    rule: &ShardingRule,
    conditions: &[ShardingCondition],
    hints: &Hints,
) -> Result<Vec<RoutingUnit>, Error> {
    let names = statement.table_names();
    let sharded: Vec<&String> = names
        .iter()
        .filter(|name| rule.table(name).is_some())
        .collect();

    let units = if sharded.is_empty() {
        route_unsharded(statement, rule, &names)?
    } else {
        let mut groups: Vec<Vec<String>> = vec![];
        for name in &sharded {
            if groups.iter().any(|group| group.contains(name)) {
                continue;
            }
            let group = match rule.binding_group(name) {
                Some(binding) => sharded
                    .iter()
                    .filter(|other| binding.contains(other))
                    .map(|other| other.to_string())
                    .collect(),
                None => vec![name.to_string()],
            };
            groups.push(group);
        }

        let mut targets: Option<Vec<Target>> = None;
        for group in &groups {
            let routed = route_group(statement, rule, group, conditions, hints)?;
            targets = Some(match targets {
                None => routed,
                Some(targets) => combine(targets, routed, &groups)?,
            });
        }

        targets
            .unwrap_or_default()
            .into_iter()
            .map(|target| RoutingUnit {
                data_source: target.data_source,
                tables: target.tables,
                rows: target.rows,
            })
            .collect()
    };

    debug!(
        "routed to {} unit{}",
        units.len(),
        if units.len() == 1 { "" } else { "s" }
    );

    Ok(units)
}

fn route_unsharded(
    statement: &Statement,
    rule: &ShardingRule,
    names: &[String],
) -> Result<Vec<RoutingUnit>, Error> {
    let broadcast = !names.is_empty() && names.iter().all(|name| rule.is_broadcast(name));

    if broadcast {
        if statement.kind == StatementKind::Select {
            let data_source = rule.data_sources.first().ok_or(Error::NoDataSource)?;
            return Ok(vec![RoutingUnit::new(data_source)]);
        }
        return Ok(rule
            .data_sources
            .iter()
            .map(|data_source| RoutingUnit::new(data_source))
            .collect());
    }

    let data_source = rule
        .default_data_source
        .as_deref()
        .ok_or(Error::NoDataSource)?;
    Ok(vec![RoutingUnit::new(data_source)])
}

/// Route tables that must land on the same nodes.
fn route_group(
    statement: &Statement,
    rule: &ShardingRule,
    group: &[String],
    conditions: &[ShardingCondition],
    hints: &Hints,
) -> Result<Vec<Target>, Error> {
    let mut routed = vec![];
    for name in group {
        let table_rule = rule
            .table(name)
            .ok_or_else(|| Error::NoRoute(name.clone()))?;
        routed.push(route_table(name, table_rule, rule, conditions, hints)?);
    }

    // Members without conditions follow the first one that has some.
    let Some(primary) = routed
        .iter()
        .find(|routed| routed.constrained)
        .or_else(|| routed.first())
    else {
        return Ok(vec![]);
    };

    for other in &routed {
        if other.constrained && other.nodes != primary.nodes {
            return Err(Error::InconsistentRouting {
                tables: group.to_vec(),
            });
        }
    }

    if statement.kind == StatementKind::Insert {
        let mut seen = BTreeSet::new();
        for rows in primary.rows.values() {
            for row in rows {
                if !seen.insert(*row) {
                    return Err(Error::unsupported(format!(
                        "INSERT row {} into \"{}\" routes to more than one data node",
                        row, primary.rule.logic_table
                    )));
                }
            }
        }
    }

    Ok(primary
        .nodes
        .iter()
        .map(|position| Target {
            data_source: primary.rule.data_nodes[*position].data_source.clone(),
            tables: routed
                .iter()
                .map(|routed| {
                    TableMapping::new(
                        &routed.rule.logic_table,
                        &routed.rule.data_nodes[*position].table,
                    )
                })
                .collect(),
            rows: (statement.kind == StatementKind::Insert)
                .then(|| primary.rows.get(position).cloned().unwrap_or_default()),
        })
        .collect())
}

fn route_table<'a>(
    name: &str,
    table_rule: &'a TableRule,
    rule: &ShardingRule,
    conditions: &[ShardingCondition],
    hints: &Hints,
) -> Result<Routed<'a>, Error> {
    let unconditioned = [ShardingCondition::default()];
    let conditions = if conditions.is_empty() {
        &unconditioned[..]
    } else {
        conditions
    };

    let database_hints = hints.database_values(name);
    let table_hints = hints.table_values(name);

    let mut nodes = BTreeSet::new();
    let mut rows: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut constrained = database_hints.is_some() || table_hints.is_some();
    let mut all_false = true;

    for condition in conditions {
        if condition.always_false {
            continue;
        }
        all_false = false;

        let values = condition.values_of(name);
        constrained |= !values.is_empty();

        let database_input = Input {
            values: &values,
            hints: database_hints,
            allow_range_inline: rule.allow_range_inline,
        };
        let table_input = Input {
            hints: table_hints,
            ..database_input
        };

        let data_sources = table_rule.data_sources();
        for data_source in table_rule
            .database_strategy
            .shard(&data_sources, &database_input)?
        {
            let tables = table_rule.tables_in(data_source);
            for table in table_rule.table_strategy.shard(&tables, &table_input)? {
                if let Some(position) = table_rule.position(data_source, table) {
                    nodes.insert(position);
                    if let Some(row) = condition.row {
                        rows.entry(position).or_default().push(row);
                    }
                }
            }
        }
    }

    // Nothing can match; any single node returns the right (empty) answer.
    if all_false {
        nodes.insert(0);
        constrained = true;
    }

    if nodes.is_empty() {
        return Err(Error::NoRoute(table_rule.logic_table.clone()));
    }

    trace!("\"{}\" routes to data nodes {:?}", name, nodes);

    Ok(Routed {
        rule: table_rule,
        nodes: nodes.into_iter().collect(),
        rows,
        constrained,
    })
}

/// Cartesian product of two groups' targets within each data source.
fn combine(
    left: Vec<Target>,
    right: Vec<Target>,
    groups: &[Vec<String>],
) -> Result<Vec<Target>, Error> {
    let mut combined = vec![];
    for left in &left {
        for right in right.iter().filter(|r| r.data_source == left.data_source) {
            let mut tables = left.tables.clone();
            tables.extend(right.tables.iter().cloned());
            combined.push(Target {
                data_source: left.data_source.clone(),
                tables,
                rows: left.rows.clone(),
            });
        }
    }

    if combined.is_empty() {
        return Err(Error::NoCommonDataSource(groups.concat()));
    }

    Ok(combined)
}

/// Is the statement flagged as shadow traffic.
pub fn is_shadow(statement: &Statement, rule: &ShardingRule) -> Result<bool, Error> {
    let Some(column) = rule.shadow_column() else {
        return Ok(false);
    };

    if let Some(insert) = &statement.insert {
        if let Some(index) = insert.column_index(column) {
            let mut flags = insert.rows.iter().map(|row| {
                row.values
                    .get(index)
                    .and_then(|value| statement.evaluate(&value.value))
                    .is_some_and(|value| value.is_truthy())
            });
            let first = flags.next().unwrap_or(false);
            if flags.any(|flag| flag != first) {
                return Err(Error::unsupported("INSERT mixes shadow and production rows"));
            }
            return Ok(first);
        }
    }

    let Some(where_clause) = &statement.where_clause else {
        return Ok(false);
    };

    Ok(where_clause
        .branches
        .iter()
        .flat_map(|branch| &branch.predicates)
        .filter(|predicate| predicate.column.name.eq_ignore_ascii_case(column))
        .any(|predicate| match &predicate.operator {
            Operator::Equal(expression) => statement
                .evaluate(&expression.value)
                .is_some_and(|value| value.is_truthy()),
            _ => false,
        }))
}

/// Send every unit to its shadow data source.
pub fn shadow(units: &mut [RoutingUnit], rule: &ShardingRule) -> Result<(), Error> {
    let Some(shadow) = &rule.shadow else {
        return Ok(());
    };

    for unit in units {
        let target = shadow.mappings.get(&unit.data_source).ok_or_else(|| {
            Error::unsupported(format!(
                "no shadow data source for \"{}\"",
                unit.data_source
            ))
        })?;
        unit.data_source = target.clone();
    }

    Ok(())
}
