//! Routing hints.
//!
//! Hints supply sharding values the statement doesn't carry, or
//! override the ones it does. They come from the caller or from
//! comments in the statement itself:
//!
//! ```sql
//! SELECT * FROM t_user /* shardgate: t_user.user_id=5 */
//! SELECT * FROM t_log /* shardgate_database: t_log=1, shardgate_table: t_log='2024' */
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::statement::Value;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)/\*(.*?)\*/"#).unwrap());
static VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"shardgate(?:_(database|table))?: *([a-zA-Z0-9_]+)(?:\.([a-zA-Z0-9_]+))? *= *(?:"([^"]*)"|'([^']*)'|(-?[0-9]+))"#,
    )
    .unwrap()
});

/// Hint values, by lowercase table (and column).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    values: HashMap<(String, String), Vec<Value>>,
    database: HashMap<String, Vec<Value>>,
    table: HashMap<String, Vec<Value>>,
}

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint a value for `table.column`. Repeat to hint several values.
    pub fn value(mut self, table: &str, column: &str, value: impl Into<Value>) -> Self {
        self.values
            .entry((table.to_lowercase(), column.to_lowercase()))
            .or_default()
            .push(value.into());
        self
    }

    /// Hint a value for the database dimension of a hint strategy.
    pub fn database(mut self, table: &str, value: impl Into<Value>) -> Self {
        self.database
            .entry(table.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Hint a value for the table dimension of a hint strategy.
    pub fn table(mut self, table: &str, value: impl Into<Value>) -> Self {
        self.table
            .entry(table.to_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Hints written in `/* ... */` comments.
    pub fn from_comments(sql: &str) -> Self {
        let mut hints = Self::new();

        for comment in COMMENT.captures_iter(sql) {
            let Some(comment) = comment.get(1) else {
                continue;
            };

            for cap in VALUE.captures_iter(comment.as_str()) {
                let value = if let Some(text) = cap.get(4).or_else(|| cap.get(5)) {
                    Value::Text(text.as_str().to_string())
                } else if let Some(number) = cap.get(6).and_then(|n| n.as_str().parse().ok()) {
                    Value::Integer(number)
                } else {
                    continue;
                };

                let Some(table) = cap.get(2).map(|t| t.as_str()) else {
                    continue;
                };

                hints = match (cap.get(1).map(|d| d.as_str()), cap.get(3)) {
                    (Some("database"), None) => hints.database(table, value),
                    (Some("table"), None) => hints.table(table, value),
                    (None, Some(column)) => hints.value(table, column.as_str(), value),
                    _ => hints,
                };
            }
        }

        hints
    }

    /// Merge `other` in. Its hints replace ours for the same target.
    pub fn merge(&mut self, other: Hints) {
        self.values.extend(other.values);
        self.database.extend(other.database);
        self.table.extend(other.table);
    }

    /// Hinted values of `table.column`.
    pub fn values_of(&self, table: &str, column: &str) -> Option<&[Value]> {
        self.values
            .get(&(table.to_lowercase(), column.to_lowercase()))
            .map(|v| v.as_slice())
    }

    /// Columns of `table` with hinted values.
    pub fn columns_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (&'a str, &'a [Value])> {
        self.values
            .iter()
            .filter(move |((t, _), _)| t.eq_ignore_ascii_case(table))
            .map(|((_, column), values)| (column.as_str(), values.as_slice()))
    }

    pub fn database_values(&self, table: &str) -> Option<&[Value]> {
        self.database
            .get(&table.to_lowercase())
            .map(|v| v.as_slice())
    }

    pub fn table_values(&self, table: &str) -> Option<&[Value]> {
        self.table.get(&table.to_lowercase()).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.database.is_empty() && self.table.is_empty()
    }
}
