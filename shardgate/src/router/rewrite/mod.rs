//! SQL rewriting: one physical statement per routing unit.
//!
//! Generators look at the statement and the routing result and emit
//! positional edits against the original text. All edits for a unit are
//! applied in one pass; if any of them is invalid, the unit fails.

pub mod distinct;
pub mod error;
pub mod insert;
pub mod pagination;
pub mod shadow;
pub mod table;
pub mod token;

use std::collections::HashMap;

use tracing::trace;

pub use error::Error;
pub use token::SqlToken;

use super::route::{RoutingResult, RoutingUnit};
use super::statement::{Statement, Value};

/// Physical statement for one data source.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

/// What the generators work with.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub statement: &'a Statement,
    pub result: &'a RoutingResult,
    pub unit: &'a RoutingUnit,
}

impl Context<'_> {
    /// INSERT row is sent to this unit.
    pub fn kept(&self, row: usize) -> bool {
        self.unit
            .rows
            .as_ref()
            .is_none_or(|rows| rows.contains(&row))
    }
}

/// Rewrite the statement for one unit.
pub fn rewrite(
    statement: &Statement,
    result: &RoutingResult,
    unit: &RoutingUnit,
) -> Result<SqlUnit, Error> {
    let context = Context {
        statement,
        result,
        unit,
    };

    let mut tokens = table::tokens(&context);
    let (pagination, overrides) = pagination::tokens(&context);
    tokens.extend(pagination);
    tokens.extend(shadow::tokens(&context)?);
    tokens.extend(distinct::tokens(&context));
    tokens.extend(insert::tokens(&context));

    let sql = token::apply(&statement.sql, &mut tokens)?;
    let parameters = parameters(statement, &tokens, &overrides)?;

    trace!(
        "[{}] {} edit{}",
        unit.data_source,
        tokens.len(),
        if tokens.len() == 1 { "" } else { "s" }
    );

    Ok(SqlUnit {
        data_source: unit.data_source.clone(),
        sql,
        parameters,
    })
}

/// Parameters for the rewritten text: overridden where asked, dropped
/// where their marker was edited away.
fn parameters(
    statement: &Statement,
    tokens: &[SqlToken],
    overrides: &HashMap<usize, Value>,
) -> Result<Vec<Value>, Error> {
    if let Some(index) = overrides
        .keys()
        .find(|index| **index >= statement.parameters.len())
    {
        return Err(Error::MissingParameter(*index));
    }

    Ok(statement
        .parameters
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            statement
                .parameter_markers
                .get(*index)
                .is_none_or(|marker| !tokens.iter().any(|token| token.covers(*marker)))
        })
        .map(|(index, value)| overrides.get(&index).unwrap_or(value).clone())
        .collect())
}
