pub mod config;
pub mod error;
pub mod logging;

pub use config::{AccumulatorConfig, BatchSettings};
pub use error::*;
