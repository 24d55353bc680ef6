//! Logical table names to actual table names.

use super::{Context, SqlToken};

pub fn tokens(context: &Context) -> Vec<SqlToken> {
    context
        .statement
        .tables
        .iter()
        .filter_map(|table| {
            let actual = context.unit.actual_table(&table.name)?;
            (actual != table.name).then(|| SqlToken::replace(table.start, table.stop, actual))
        })
        .collect()
}
