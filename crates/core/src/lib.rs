pub mod config;
pub mod error;
pub mod types;

pub use config::{GleanerConfig, SchedulerConfig, SimConfig};
pub use error::*;
pub use types::*;
