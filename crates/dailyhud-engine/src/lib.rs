//! Orchestration engine for daily-hud
//!
//! Runs the selected probes on a bounded worker pool, folds their results
//! into a single severity-ranked run and renders it.

mod aggregate;
mod output;
mod runner;

pub use aggregate::*;
pub use output::*;
pub use runner::*;
