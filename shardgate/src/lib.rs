pub mod cli;
pub mod config;
pub mod logger;
pub mod merge;
pub mod router;
pub mod unique_id;

pub use merge::MergeBuffer;
pub use router::{Hints, Router, RoutingResult, SqlUnit, Statement};
