//! Per-key min/mean/max over large `key;value` files.
//!
//! The input is split into line-aligned shards, each shard is scanned on its
//! own thread into a private fixed-capacity table, and the tables are merged
//! into one report sorted by key:
//!
//! ```text
//! {Abha=-23.0/18.0/59.2, Abidjan=-16.2/26.0/67.3, ...}
//! ```
//!
//! Values have at most two integer digits and one fractional digit and are
//! kept as integer tenths until they are printed.

pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod plan;
pub mod report;
pub mod scan;
pub mod shard;
pub mod stats;
pub mod table;

pub use config::{Config, ReadMode};
pub use engine::{aggregate_bytes, Engine};
pub use error::{Error, Result};
pub use report::{render, write_report, Totals};
pub use stats::KeyStats;

/// Aggregates the file described by `config` and returns the rendered report.
pub fn process(config: Config) -> Result<String> {
    Engine::new(config)?.run()
}
