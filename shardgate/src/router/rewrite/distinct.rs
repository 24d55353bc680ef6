//! `COUNT(DISTINCT x)` across shards: each shard returns the distinct
//! values and the merge does the counting.

use super::{Context, SqlToken};

pub fn derived_alias(index: usize) -> String {
    format!("AGGREGATION_DISTINCT_DERIVED_{}", index)
}

pub fn tokens(context: &Context) -> Vec<SqlToken> {
    let Some(select) = &context.statement.select else {
        return vec![];
    };
    if !context.result.is_cross_shard() || select.distinct_aggregates.is_empty() {
        return vec![];
    }

    let mut tokens = vec![SqlToken::insert(select.projections_start, "DISTINCT ")];
    let mut derived = 0;

    for aggregate in &select.distinct_aggregates {
        let text = if aggregate.alias.is_some() {
            aggregate.argument.clone()
        } else {
            let text = format!("{} AS {}", aggregate.argument, derived_alias(derived));
            derived += 1;
            text
        };
        tokens.push(SqlToken::replace(aggregate.start, aggregate.stop, text));
    }

    tokens
}
