//! Strip the shadow column. Neither production nor shadow tables have it.

use super::{token::remove_elements, Context, Error, SqlToken};

pub fn tokens(context: &Context) -> Result<Vec<SqlToken>, Error> {
    let Some(column) = context.result.rule.shadow_column() else {
        return Ok(vec![]);
    };
    let statement = context.statement;
    let matches = |name: &str| name.eq_ignore_ascii_case(column);

    let mut tokens = vec![];

    if let Some(insert) = &statement.insert {
        if let Some(index) = insert.column_index(column) {
            let spans: Vec<(usize, usize)> = insert
                .columns
                .iter()
                .map(|column| (column.start, column.stop))
                .collect();
            if spans.len() == 1 {
                return Err(Error::UnsupportedRemoval("INSERT column"));
            }
            tokens.extend(remove_elements(&spans, &[index]));

            for (row_index, row) in insert.rows.iter().enumerate() {
                if !context.kept(row_index) {
                    continue;
                }
                let spans: Vec<(usize, usize)> = row
                    .values
                    .iter()
                    .map(|value| (value.start, value.stop))
                    .collect();
                tokens.extend(remove_elements(&spans, &[index]));
            }
        }
    }

    let assigned: Vec<usize> = statement
        .assignments
        .iter()
        .enumerate()
        .filter(|(_, assignment)| matches(&assignment.column.name))
        .map(|(index, _)| index)
        .collect();
    if !assigned.is_empty() {
        if assigned.len() == statement.assignments.len() {
            return Err(Error::UnsupportedRemoval("SET assignment"));
        }
        let spans: Vec<(usize, usize)> = statement
            .assignments
            .iter()
            .map(|assignment| (assignment.start, assignment.stop))
            .collect();
        tokens.extend(remove_elements(&spans, &assigned));
    }

    if let Some(where_clause) = &statement.where_clause {
        // Multi-branch clauses with the column are rejected before routing.
        if let [branch] = where_clause.branches.as_slice() {
            let removed: Vec<usize> = branch
                .predicates
                .iter()
                .enumerate()
                .filter(|(_, predicate)| matches(&predicate.column.name))
                .map(|(index, _)| index)
                .collect();

            if !removed.is_empty() && removed.len() == branch.predicates.len() {
                // Whole clause, with the whitespace in front of it.
                let before = statement.sql.get(..where_clause.start).ok_or(
                    Error::TokenOutOfBounds {
                        start: where_clause.start,
                        stop: where_clause.stop,
                        len: statement.sql.len(),
                    },
                )?;
                let start = before.trim_end().len();
                tokens.push(SqlToken::remove(start, where_clause.stop));
            } else if !removed.is_empty() {
                let spans: Vec<(usize, usize)> = branch
                    .predicates
                    .iter()
                    .map(|predicate| (predicate.start, predicate.stop))
                    .collect();
                tokens.extend(remove_elements(&spans, &removed));
            }
        }
    }

    Ok(tokens)
}
