//! Assembled report types and file persistence

pub mod file;
pub mod schema;

pub use file::{load_report, save_report};
pub use schema::{
    CallTreeNode, CallTreeReport, FileHeatmap, FlameNode, FlameReport, HeatmapReport,
    MemoryReport, Report, SourceLine,
};
