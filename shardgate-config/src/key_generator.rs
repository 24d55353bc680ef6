use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::Error;

/// Key generator attached to a logical table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct KeyGeneratorConfig {
    /// Column filled in when an INSERT leaves it out.
    pub column: String,
    #[serde(rename = "type")]
    pub kind: KeyGeneratorKind,
    /// Generator options, e.g. `worker.id`, `step`.
    #[serde(default)]
    pub props: Props,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyGeneratorKind {
    #[default]
    Snowflake,
    LeafSegment,
    Uuid,
}

impl std::fmt::Display for KeyGeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snowflake => write!(f, "snowflake"),
            Self::LeafSegment => write!(f, "leaf_segment"),
            Self::Uuid => write!(f, "uuid"),
        }
    }
}

/// Generator properties with typed accessors. Values may be
/// written as strings, integers or booleans.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Props {
    values: HashMap<String, PropValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum PropValue {
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl std::fmt::Display for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
        }
    }
}

impl Props {
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|v| v.to_string())
    }

    /// Parse a property, falling back to `default` if it's not set.
    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, Error> {
        match self.get(name) {
            Some(value) => value.trim().parse().map_err(|_| Error::InvalidProperty {
                name: name.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    pub fn set(&mut self, name: impl ToString, value: impl ToString) -> &mut Self {
        self.values
            .insert(name.to_string(), PropValue::String(value.to_string()));
        self
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.to_string(), PropValue::String(v.to_string())))
                .collect(),
        }
    }
}
