//! Values a sharding column is constrained to.

use std::cmp::Ordering;
use std::ops::Bound;

use crate::router::statement::Value;

/// Values a sharding column can take in one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    /// `col = 1`, `col IN (1, 2)`.
    List(Vec<Value>),
    /// `col BETWEEN 1 AND 5`, `col > 3`.
    Range(Range),
}

impl ShardingValue {
    pub fn single(value: Value) -> Self {
        Self::List(vec![value])
    }

    /// Both constraints hold at once. `None` if no value satisfies both.
    pub fn intersect(&self, other: &ShardingValue) -> Option<ShardingValue> {
        let result = match (self, other) {
            (Self::List(left), Self::List(right)) => {
                let mut values = vec![];
                for value in left {
                    if right.contains(value) && !values.contains(value) {
                        values.push(value.clone());
                    }
                }
                Self::List(values)
            }
            (Self::List(values), Self::Range(range)) | (Self::Range(range), Self::List(values)) => {
                Self::List(
                    values
                        .iter()
                        .filter(|value| range.contains(value))
                        .cloned()
                        .collect(),
                )
            }
            (Self::Range(left), Self::Range(right)) => Self::Range(left.intersect(right)),
        };

        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(values) => values.is_empty(),
            Self::Range(range) => range.is_empty(),
        }
    }
}

/// Range of values, bounds optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl Range {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    /// `BETWEEN low AND high`.
    pub fn closed(low: Value, high: Value) -> Self {
        Self::new(Bound::Included(low), Bound::Included(high))
    }

    pub fn contains(&self, value: &Value) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => value >= lower,
            Bound::Excluded(lower) => value > lower,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => value <= upper,
            Bound::Excluded(upper) => value < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lower), Bound::Included(upper)) => lower > upper,
            (Bound::Included(lower), Bound::Excluded(upper))
            | (Bound::Excluded(lower), Bound::Included(upper))
            | (Bound::Excluded(lower), Bound::Excluded(upper)) => lower >= upper,
            _ => false,
        }
    }

    pub fn intersect(&self, other: &Range) -> Range {
        Range {
            lower: tighter(&self.lower, &other.lower, Ordering::Greater),
            upper: tighter(&self.upper, &other.upper, Ordering::Less),
        }
    }

    /// Integer bounds, inclusive, if both ends are integers.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        Some((self.integer_lower()?, self.integer_upper()?))
    }

    /// Smallest integer in range, if bounded below by an integer.
    pub fn integer_lower(&self) -> Option<i64> {
        match &self.lower {
            Bound::Included(value) => value.as_integer(),
            Bound::Excluded(value) => value.as_integer()?.checked_add(1),
            Bound::Unbounded => None,
        }
    }

    /// Largest integer in range, if bounded above by an integer.
    pub fn integer_upper(&self) -> Option<i64> {
        match &self.upper {
            Bound::Included(value) => value.as_integer(),
            Bound::Excluded(value) => value.as_integer()?.checked_sub(1),
            Bound::Unbounded => None,
        }
    }
}

/// Pick the more restrictive bound. `prefer` is the ordering that
/// makes a bound tighter: greater for lower bounds, less for upper.
fn tighter(left: &Bound<Value>, right: &Bound<Value>, prefer: Ordering) -> Bound<Value> {
    match (left, right) {
        (Bound::Unbounded, bound) | (bound, Bound::Unbounded) => bound.clone(),
        (
            Bound::Included(l) | Bound::Excluded(l),
            Bound::Included(r) | Bound::Excluded(r),
        ) => match l.cmp(r) {
            Ordering::Equal => {
                if matches!(left, Bound::Excluded(_)) {
                    left.clone()
                } else {
                    right.clone()
                }
            }
            ordering if ordering == prefer => left.clone(),
            _ => right.clone(),
        },
    }
}
