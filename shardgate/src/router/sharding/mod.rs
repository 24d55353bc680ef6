//! Sharding rule and the strategies it is made of.

pub mod error;
pub mod inline;
pub mod rule;
pub mod strategy;
pub mod value;

pub use error::Error;
pub use inline::InlineExpression;
pub use rule::{DataNode, KeyGeneratorRule, ShadowRule, ShardingRule, TableRule};
pub use strategy::{Algorithm, Input, Strategy};
pub use value::{Range, ShardingValue};
