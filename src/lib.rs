//! profviz
//!
//! Execution telemetry aggregation engine with an interactive
//! profile stats server.
//!
//! profviz turns raw telemetry collected from a program run (exact
//! call records, statistically sampled call stacks, per-line timings
//! and heap snapshots) into a single mode-keyed JSON report, and
//! serves that report over HTTP to a browser visualization.
//!
//! This crate provides the core implementation for the `profviz`
//! CLI tool.
//!
//! ## Getting Started
//!
//! Most users should install and use the CLI:
//!
//! ```bash
//! cargo install profviz
//! profviz --help
//! ```

pub mod aggregator;
pub mod commands;
pub mod probe;
pub mod report;
pub mod server;
pub mod utils;
