//! Bound statement handed to the router by the SQL parser.
//!
//! The router doesn't parse SQL. It receives the original text together
//! with the segments it needs: table references, WHERE predicates, INSERT
//! rows, SET assignments, pagination and DISTINCT aggregates. Every
//! segment carries its position in the original text as byte offsets,
//! `start` inclusive and `stop` inclusive, which is what the rewriter
//! edits against.

use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use derive_builder::Builder;

use crate::unique_id::GeneratedKey;

/// Literal value.
///
/// Values compare numerically when both sides read as integers, so a
/// text parameter `'5'` equals the literal `5`. Text that isn't a number
/// sorts after every number.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    /// Render as a SQL literal.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => format!("'{}'", value.replace('\'', "''")),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
        }
    }

    /// Boolean reading, used for the shadow flag.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Integer(value) => *value != 0,
            Self::Text(value) => matches!(
                value.to_lowercase().as_str(),
                "1" | "true" | "t" | "yes" | "y"
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_integer(), other.as_integer()) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_integer() {
            Some(value) => value.hash(state),
            None => self.to_string().hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&GeneratedKey> for Value {
    fn from(key: &GeneratedKey) -> Self {
        match key {
            GeneratedKey::Long(value) => Self::Integer(*value),
            GeneratedKey::Text(value) => Self::Text(value.clone()),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Copy,
    LoadData,
    LoadXml,
    Other,
}

/// Reference to a table.
///
/// Every occurrence of a table name is listed, including the ones
/// qualifying a column (`t_user.name`), so the rewriter can rename all
/// of them. The alias is set on the declaring occurrence only.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSegment {
    pub name: String,
    pub alias: Option<String>,
    pub start: usize,
    pub stop: usize,
}

impl TableSegment {
    pub fn new(name: &str, start: usize, stop: usize) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            start,
            stop,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSegment {
    /// Table name or alias qualifying the column.
    pub owner: Option<String>,
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

impl ColumnSegment {
    pub fn new(name: &str, start: usize, stop: usize) -> Self {
        Self {
            owner: None,
            name: name.to_string(),
            start,
            stop,
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue {
    Literal(Value),
    /// Index into [`Statement::parameters`].
    Parameter(usize),
    /// Anything the router can't evaluate, e.g. `NOW()` or `a + 1`.
    Complex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub value: ExpressionValue,
    pub start: usize,
    pub stop: usize,
}

impl Expression {
    pub fn literal(value: impl Into<Value>, start: usize, stop: usize) -> Self {
        Self {
            value: ExpressionValue::Literal(value.into()),
            start,
            stop,
        }
    }

    pub fn parameter(index: usize, start: usize, stop: usize) -> Self {
        Self {
            value: ExpressionValue::Parameter(index),
            start,
            stop,
        }
    }

    pub fn complex(start: usize, stop: usize) -> Self {
        Self {
            value: ExpressionValue::Complex,
            start,
            stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Equal(Expression),
    In(Vec<Expression>),
    Between(Expression, Expression),
    Compare(CompareOp, Expression),
    /// `LIKE`, `<>`, `IS NULL` and friends. Never used for routing.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: ColumnSegment,
    pub operator: Operator,
    pub start: usize,
    pub stop: usize,
}

/// Predicates joined by AND.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AndPredicate {
    pub predicates: Vec<Predicate>,
}

/// WHERE clause in disjunctive normal form.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereSegment {
    /// Position of the `WHERE` keyword.
    pub start: usize,
    pub stop: usize,
    /// OR branches.
    pub branches: Vec<AndPredicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    /// Opening parenthesis.
    pub start: usize,
    /// Closing parenthesis.
    pub stop: usize,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertSegment {
    pub columns: Vec<ColumnSegment>,
    /// Closing parenthesis of the column list, if there is one.
    pub columns_stop: Option<usize>,
    pub rows: Vec<InsertRow>,
}

impl InsertSegment {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }
}

/// `column = value` in an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnSegment,
    pub value: Expression,
    pub start: usize,
    pub stop: usize,
}

/// `COUNT(DISTINCT col)` and friends.
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctAggregate {
    /// Distinct argument, e.g. `user_id`.
    pub argument: String,
    /// Alias written after the aggregate, if any.
    pub alias: Option<String>,
    pub start: usize,
    pub stop: usize,
}

/// Offset or row count.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationValue {
    pub value: ExpressionValue,
    /// `ROWNUM <= 10` and `rn >= 5` are inclusive, `<` and `>` aren't.
    /// Ignored for LIMIT dialects.
    pub inclusive: bool,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaginationSegment {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectSegment {
    /// Position of the first projection.
    pub projections_start: usize,
    pub distinct_aggregates: Vec<DistinctAggregate>,
    pub pagination: Option<PaginationSegment>,
    /// Statement has GROUP BY or aggregate projections.
    pub grouped: bool,
    /// GROUP BY and ORDER BY list the same items.
    pub same_group_and_order: bool,
}

impl SelectSegment {
    /// Grouped result ordered differently than grouped; every shard
    /// must return every row for the merge to be correct.
    pub fn needs_all_rows(&self) -> bool {
        self.grouped && !self.same_group_and_order
    }
}

/// Parsed and bound statement.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default, setter(into))]
pub struct Statement {
    pub sql: String,
    pub kind: StatementKind,
    pub tables: Vec<TableSegment>,
    #[builder(setter(strip_option))]
    pub where_clause: Option<WhereSegment>,
    #[builder(setter(strip_option))]
    pub insert: Option<InsertSegment>,
    pub assignments: Vec<Assignment>,
    #[builder(setter(strip_option))]
    pub select: Option<SelectSegment>,
    /// Bound parameter values.
    pub parameters: Vec<Value>,
    /// Position of each parameter marker in `sql`, by parameter index.
    pub parameter_markers: Vec<usize>,
}

impl Statement {
    /// Distinct table names, lowercase, in order of appearance.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = vec![];
        for table in &self.tables {
            let name = table.name.to_lowercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Resolve an alias or table name to a table name, lowercase.
    pub fn resolve_owner(&self, owner: &str) -> Option<String> {
        self.tables
            .iter()
            .find(|t| {
                t.alias
                    .as_deref()
                    .is_some_and(|alias| alias.eq_ignore_ascii_case(owner))
            })
            .or_else(|| {
                self.tables
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(owner))
            })
            .map(|t| t.name.to_lowercase())
    }

    /// Resolve an expression to a value, if it is one.
    pub fn evaluate(&self, expression: &ExpressionValue) -> Option<Value> {
        match expression {
            ExpressionValue::Literal(value) => Some(value.clone()),
            ExpressionValue::Parameter(index) => self.parameters.get(*index).cloned(),
            ExpressionValue::Complex => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builder() {
        let sql = "SELECT * FROM t_user u WHERE u.user_id = ?";
        let statement = StatementBuilder::default()
            .sql(sql)
            .tables(vec![TableSegment::new("t_user", 14, 19).with_alias("u")])
            .parameters(vec![Value::Integer(5)])
            .parameter_markers(vec![41])
            .build()
            .unwrap();

        assert_eq!(statement.kind, StatementKind::Select);
        assert_eq!(&statement.sql[14..=19], "t_user");
        assert_eq!(statement.resolve_owner("U").as_deref(), Some("t_user"));
        assert_eq!(statement.resolve_owner("t_order"), None);
        assert_eq!(
            statement.evaluate(&ExpressionValue::Parameter(0)),
            Some(Value::Integer(5))
        );
        assert_eq!(statement.evaluate(&ExpressionValue::Parameter(1)), None);
    }

    #[test]
    fn test_value_mixed_types() {
        assert_eq!(Value::Integer(5), Value::from("5"));
        assert_eq!(Value::from(" 5"), Value::from("5"));
        assert_ne!(Value::Integer(5), Value::from("five"));
        assert!(Value::from("10") > Value::Integer(9));
        assert!(Value::Integer(i64::MAX) < Value::from("abc"));
        assert!(Value::from("abc") < Value::from("abd"));

        let mut values = vec![Value::from("b"), Value::from("12"), Value::Integer(3)];
        values.sort();
        assert_eq!(
            values,
            vec![Value::Integer(3), Value::Integer(12), Value::from("b")]
        );
    }

    #[test]
    fn test_value_sql() {
        assert_eq!(Value::Integer(-3).to_sql(), "-3");
        assert_eq!(Value::from("it's").to_sql(), "'it''s'");
        assert!(Value::from("TRUE").is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert_eq!(Value::from(" 42 ").as_integer(), Some(42));
    }
}
