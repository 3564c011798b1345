//! Configuration, input loading, screening, the parallel runner and reports.

pub mod config;
pub mod data;
pub mod report;
pub mod runner;
pub mod screening;

pub use config::{ConfigError, RunConfig};
pub use runner::{RunOutcome, StateRun, run_states, run_states_with};
pub use screening::SkipReason;
