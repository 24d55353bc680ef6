//! INSERT rows for one unit, plus generated keys.

use super::{token::remove_elements, Context, SqlToken};
use crate::router::statement::Value;

pub fn tokens(context: &Context) -> Vec<SqlToken> {
    let Some(insert) = &context.statement.insert else {
        return vec![];
    };

    let mut tokens = vec![];

    if let Some(rows) = &context.unit.rows {
        let spans: Vec<(usize, usize)> =
            insert.rows.iter().map(|row| (row.start, row.stop)).collect();
        let removed: Vec<usize> = (0..insert.rows.len())
            .filter(|row| !rows.contains(row))
            .collect();
        tokens.extend(remove_elements(&spans, &removed));
    }

    if let (Some(generated), Some(columns_stop)) =
        (&context.result.generated_keys, insert.columns_stop)
    {
        tokens.push(SqlToken::insert(columns_stop, format!(", {}", generated.column)));
        for (index, row) in insert.rows.iter().enumerate() {
            if !context.kept(index) {
                continue;
            }
            if let Some(key) = generated.keys.get(index) {
                tokens.push(SqlToken::insert(
                    row.stop,
                    format!(", {}", Value::from(key).to_sql()),
                ));
            }
        }
    }

    tokens
}
