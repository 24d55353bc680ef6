//! Sharding strategies.
//!
//! A strategy maps the values of its sharding columns to the subset of
//! targets (data sources or actual tables) that can hold matching rows.

use std::collections::HashMap;

use shardgate_config::{Algorithm as AlgorithmConfig, Strategy as StrategyConfig};

use super::inline::{hash, InlineExpression};
use super::value::{Range, ShardingValue};
use super::Error;
use crate::router::statement::Value;

/// Variable bound to hint values in hint expressions.
pub const HINT_VARIABLE: &str = "value";

/// Precise and range sharding over numbered targets.
///
/// Targets are matched by the number at the end of their name, so
/// `t_order_3` is shard 3.
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    Mod { count: u64 },
    HashMod { count: u64 },
    BoundaryRange { boundaries: Vec<i64> },
}

impl Algorithm {
    fn new(config: &AlgorithmConfig) -> Result<Self, Error> {
        Ok(match config {
            AlgorithmConfig::Mod { count } if *count == 0 => {
                return Err(Error::InvalidCount("mod"))
            }
            AlgorithmConfig::HashMod { count } if *count == 0 => {
                return Err(Error::InvalidCount("hash_mod"))
            }
            AlgorithmConfig::Mod { count } => Self::Mod { count: *count },
            AlgorithmConfig::HashMod { count } => Self::HashMod { count: *count },
            AlgorithmConfig::BoundaryRange { boundaries } => {
                let mut boundaries = boundaries.clone();
                boundaries.sort_unstable();
                boundaries.dedup();
                Self::BoundaryRange { boundaries }
            }
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Mod { .. } => "mod",
            Self::HashMod { .. } => "hash_mod",
            Self::BoundaryRange { .. } => "boundary_range",
        }
    }

    fn shard(&self, value: &Value) -> Result<u64, Error> {
        let invalid = || Error::InvalidValue {
            algorithm: self.name(),
            value: value.to_string(),
        };

        Ok(match self {
            Self::Mod { count } => {
                let value = value.as_integer().ok_or_else(invalid)?;
                value.rem_euclid(*count as i64) as u64
            }
            Self::HashMod { count } => hash(&value.to_string()) as u64 % count,
            Self::BoundaryRange { boundaries } => {
                let value = value.as_integer().ok_or_else(invalid)?;
                boundaries.partition_point(|boundary| *boundary <= value) as u64
            }
        })
    }

    /// Shards a range can touch. `None` means all of them.
    fn shards_in(&self, range: &Range) -> Result<Option<Vec<u64>>, Error> {
        match self {
            Self::Mod { count } => {
                let Some((low, high)) = range.integer_bounds() else {
                    return Ok(None);
                };
                if low > high {
                    return Ok(Some(vec![]));
                }
                if high.abs_diff(low) >= *count - 1 {
                    return Ok(None);
                }
                let mut shards = vec![];
                for value in low..=high {
                    let shard = self.shard(&Value::Integer(value))?;
                    if !shards.contains(&shard) {
                        shards.push(shard);
                    }
                }
                Ok(Some(shards))
            }

            Self::HashMod { .. } => Ok(None),

            Self::BoundaryRange { .. } => {
                let low = range.integer_lower().unwrap_or(i64::MIN);
                let high = range.integer_upper().unwrap_or(i64::MAX);
                if low > high {
                    return Ok(Some(vec![]));
                }
                let first = self.shard(&Value::Integer(low))?;
                let last = self.shard(&Value::Integer(high))?;
                Ok(Some((first..=last).collect()))
            }
        }
    }
}

/// Number at the end of a target name.
fn suffix(target: &str) -> Option<u64> {
    let digits = target.len() - target.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    target[target.len() - digits..].parse().ok()
}

/// What a strategy is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    /// Column values, lowercase column names.
    pub values: &'a HashMap<String, ShardingValue>,
    /// Hint values for this dimension, if any were given.
    pub hints: Option<&'a [Value]>,
    pub allow_range_inline: bool,
}

/// Sharding strategy for one dimension (databases or tables).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Strategy {
    Inline {
        column: String,
        expression: InlineExpression,
    },
    Standard {
        column: String,
        algorithm: Algorithm,
    },
    Complex {
        columns: Vec<String>,
        expression: InlineExpression,
    },
    Hint {
        expression: InlineExpression,
    },
    /// Not sharded in this dimension.
    #[default]
    None,
}

impl Strategy {
    pub fn new(config: &StrategyConfig) -> Result<Self, Error> {
        Ok(match config {
            StrategyConfig::Inline { column, expression } => Self::Inline {
                column: column.to_lowercase(),
                expression: InlineExpression::parse(expression)?,
            },
            StrategyConfig::Standard { column, algorithm } => Self::Standard {
                column: column.to_lowercase(),
                algorithm: Algorithm::new(algorithm)?,
            },
            StrategyConfig::Complex {
                columns,
                expression,
            } => Self::Complex {
                columns: columns.iter().map(|c| c.to_lowercase()).collect(),
                expression: InlineExpression::parse(expression)?,
            },
            StrategyConfig::Hint { expression } => Self::Hint {
                expression: InlineExpression::parse(expression)?,
            },
            StrategyConfig::None => Self::None,
        })
    }

    /// Sharding columns, lowercase.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Inline { column, .. } | Self::Standard { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(|c| c.as_str()).collect(),
            Self::Hint { .. } | Self::None => vec![],
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    /// Targets that can hold rows matching `input`, in target order.
    ///
    /// Labels the strategy produces that aren't targets are dropped.
    /// Without usable values, every target is returned.
    pub fn shard<'t>(&self, targets: &[&'t str], input: &Input) -> Result<Vec<&'t str>, Error> {
        let labels = match self.labels(targets, input)? {
            Some(labels) => labels,
            None => return Ok(targets.to_vec()),
        };

        Ok(targets
            .iter()
            .filter(|target| labels.iter().any(|label| label.eq_ignore_ascii_case(target)))
            .copied()
            .collect())
    }

    fn labels(&self, targets: &[&str], input: &Input) -> Result<Option<Vec<String>>, Error> {
        match self {
            Self::None => Ok(Some(
                targets.first().map(|t| t.to_string()).into_iter().collect(),
            )),

            Self::Inline { column, expression } => match input.values.get(column) {
                None => Ok(None),
                Some(ShardingValue::Range(_)) if input.allow_range_inline => Ok(None),
                Some(ShardingValue::Range(_)) => Err(Error::RangeNotSupported(column.clone())),
                Some(ShardingValue::List(values)) => {
                    let mut labels = vec![];
                    for value in values {
                        let variables = HashMap::from([(column.clone(), value.clone())]);
                        labels.extend(expression.evaluate(&variables)?);
                    }
                    Ok(Some(labels))
                }
            },

            Self::Standard { column, algorithm } => match input.values.get(column) {
                None => Ok(None),
                Some(ShardingValue::List(values)) => {
                    let mut shards = vec![];
                    for value in values {
                        shards.push(algorithm.shard(value)?);
                    }
                    Ok(Some(numbered(targets, &shards)))
                }
                Some(ShardingValue::Range(range)) => Ok(algorithm
                    .shards_in(range)?
                    .map(|shards| numbered(targets, &shards))),
            },

            Self::Complex {
                columns,
                expression,
            } => {
                let mut combinations: Vec<HashMap<String, Value>> = vec![HashMap::new()];
                for column in columns {
                    let values = match input.values.get(column) {
                        None => return Ok(None),
                        Some(ShardingValue::Range(_)) if input.allow_range_inline => {
                            return Ok(None)
                        }
                        Some(ShardingValue::Range(_)) => {
                            return Err(Error::RangeNotSupported(column.clone()))
                        }
                        Some(ShardingValue::List(values)) => values,
                    };
                    combinations = combinations
                        .into_iter()
                        .flat_map(|combination| {
                            values.iter().map(move |value| {
                                let mut combination = combination.clone();
                                combination.insert(column.clone(), value.clone());
                                combination
                            })
                        })
                        .collect();
                }

                let mut labels = vec![];
                for variables in &combinations {
                    labels.extend(expression.evaluate(variables)?);
                }
                Ok(Some(labels))
            }

            Self::Hint { expression } => match input.hints {
                None => Ok(None),
                Some(hints) => {
                    let mut labels = vec![];
                    for value in hints {
                        let variables =
                            HashMap::from([(HINT_VARIABLE.to_string(), value.clone())]);
                        labels.extend(expression.evaluate(&variables)?);
                    }
                    Ok(Some(labels))
                }
            },
        }
    }
}

fn numbered(targets: &[&str], shards: &[u64]) -> Vec<String> {
    targets
        .iter()
        .filter(|target| suffix(target).is_some_and(|n| shards.contains(&n)))
        .map(|target| target.to_string())
        .collect()
}
