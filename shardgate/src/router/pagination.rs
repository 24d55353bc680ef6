//! Pagination window of a SELECT.
//!
//! LIMIT dialects (MySQL, Postgres) give a row count relative to the
//! offset. ROWNUM and TOP dialects (Oracle, SQL Server) give an absolute
//! end row. Both are normalized here to "skip N, then take M".

use shardgate_config::Dialect;

use super::statement::{ExpressionValue, PaginationSegment, PaginationValue, Statement, Value};
use super::Error;

/// Row count every shard must return when the merge needs all rows.
pub const MAX_ROW_COUNT: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationContext {
    dialect: Dialect,
    segment: PaginationSegment,
    /// Rows skipped.
    offset: i64,
    /// Offset as written.
    offset_value: Option<i64>,
    /// Row count as written.
    row_count_value: Option<i64>,
    needs_all_rows: bool,
}

impl PaginationContext {
    /// Pagination of the statement, if it has any.
    pub fn new(statement: &Statement, dialect: Dialect) -> Result<Option<Self>, Error> {
        let Some(select) = &statement.select else {
            return Ok(None);
        };
        let Some(segment) = &select.pagination else {
            return Ok(None);
        };

        let offset_value = segment
            .offset
            .as_ref()
            .map(|offset| Self::resolve(statement, offset))
            .transpose()?;
        let row_count_value = segment
            .row_count
            .as_ref()
            .map(|row_count| Self::resolve(statement, row_count))
            .transpose()?;

        let offset = match (&segment.offset, offset_value) {
            (Some(written), Some(value)) => {
                if !dialect.row_count_is_relative() && written.inclusive {
                    value.saturating_sub(1)
                } else {
                    value
                }
            }
            _ => 0,
        }
        .max(0);

        Ok(Some(Self {
            dialect,
            segment: segment.clone(),
            offset,
            offset_value,
            row_count_value,
            needs_all_rows: select.needs_all_rows(),
        }))
    }

    fn resolve(statement: &Statement, value: &PaginationValue) -> Result<i64, Error> {
        let resolved = statement.evaluate(&value.value).ok_or_else(|| match value.value {
            ExpressionValue::Parameter(index) => Error::MissingParameter(index),
            _ => Error::unsupported("pagination by expression"),
        })?;

        resolved
            .as_integer()
            .ok_or_else(|| Error::unsupported(format!("pagination value \"{}\"", resolved)))
    }

    pub fn segment(&self) -> &PaginationSegment {
        &self.segment
    }

    /// Rows the merged result skips.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Rows the merged result returns after skipping, if limited.
    pub fn row_count(&self) -> Option<i64> {
        let value = self.row_count_value?;
        if self.dialect.row_count_is_relative() {
            return Some(value.max(0));
        }

        let inclusive = self
            .segment
            .row_count
            .as_ref()
            .is_some_and(|row_count| row_count.inclusive);
        let end = if inclusive {
            value
        } else {
            value.saturating_sub(1)
        };
        Some(end.saturating_sub(self.offset).max(0))
    }

    /// Offset every shard is asked for.
    pub fn revised_offset(&self) -> i64 {
        0
    }

    /// Row count every shard is asked for.
    ///
    /// Shards return everything up to the end of the window, so the
    /// merge can skip the offset over the combined result.
    pub fn revised_row_count(&self) -> Option<i64> {
        if self.needs_all_rows {
            return self.row_count_value.map(|_| MAX_ROW_COUNT);
        }

        if self.dialect.row_count_is_relative() {
            let row_count = self.row_count()?;
            Some(self.offset.saturating_add(row_count).min(MAX_ROW_COUNT))
        } else {
            // Already an end row.
            self.row_count_value
        }
    }

    /// Offset and row count as the shards should see them, in the
    /// statement's own terms.
    pub(crate) fn revised(&self) -> (Option<Value>, Option<Value>) {
        (
            self.offset_value.map(|_| Value::Integer(self.revised_offset())),
            self.revised_row_count().map(Value::Integer),
        )
    }
}
