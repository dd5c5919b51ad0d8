//! Aggregation of raw telemetry into renderable report payloads.
//!
//! Each profiling mode has its own aggregator:
//! - Call tree reconstruction from caller edges (mode `p`)
//! - Flame tree construction from stack samples (mode `c`)
//! - Per-file heatmaps with skip-compressed listings (mode `h`)
//! - Memory event collapsing and heap object deltas (mode `m`)
//!
//! The assembler validates a mode configuration, runs the selected
//! aggregators in registry order, and collects their payloads into a
//! single report.

pub mod assembler;
pub mod call_tree;
pub mod flame;
pub mod heatmap;
pub mod memory;

// Re-export main types and functions
pub use assembler::{assemble, validate_config, Aggregator, ModeRegistry};
pub use call_tree::{build_call_tree, CallTreeAggregator};
pub use flame::{build_flame_tree, FlameAggregator};
pub use heatmap::{build_file_heatmaps, compute_skip_map, HeatmapAggregator};
pub use memory::{collapse_code_events, object_delta, MemoryAggregator};

/// Round to a fixed number of decimal places, half away from zero
pub(crate) fn round_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
