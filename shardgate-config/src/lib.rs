// Submodules
pub mod core;
pub mod error;
pub mod general;
pub mod key_generator;
pub mod sharding;

pub use core::Config;
pub use error::Error;
pub use general::{Dialect, General, LogFormat};
pub use key_generator::{KeyGeneratorConfig, KeyGeneratorKind, Props};
pub use sharding::*;
