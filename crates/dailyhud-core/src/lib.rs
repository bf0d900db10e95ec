//! daily-hud Core
//!
//! Core types, configuration, the probe contract and the file-backed TTL
//! cache shared by the daily-hud crates.

pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod report;
pub mod traits;

pub use cache::{CacheStore, TtlCache};
pub use config::*;
pub use error::{HudError, Result};
pub use report::*;
pub use traits::*;
