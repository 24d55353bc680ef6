//! Widen the pagination window so every shard returns enough rows for
//! the merge to apply the real one.

use std::collections::HashMap;

use super::{Context, SqlToken};
use crate::router::statement::{ExpressionValue, PaginationValue, Value};

/// Edits for written values and overrides for parameterized ones,
/// by parameter index.
pub fn tokens(context: &Context) -> (Vec<SqlToken>, HashMap<usize, Value>) {
    let mut tokens = vec![];
    let mut overrides = HashMap::new();

    if !context.result.is_cross_shard() {
        return (tokens, overrides);
    }
    let Some(pagination) = &context.result.pagination else {
        return (tokens, overrides);
    };

    let segment = pagination.segment();
    let (offset, row_count) = pagination.revised();

    let mut revise = |written: Option<&PaginationValue>, revised: Option<Value>| {
        if let (Some(written), Some(revised)) = (written, revised) {
            match written.value {
                ExpressionValue::Parameter(index) => {
                    overrides.insert(index, revised);
                }
                _ => tokens.push(SqlToken::replace(
                    written.start,
                    written.stop,
                    revised.to_sql(),
                )),
            }
        }
    };

    revise(segment.offset.as_ref(), offset);
    revise(segment.row_count.as_ref(), row_count);

    (tokens, overrides)
}
