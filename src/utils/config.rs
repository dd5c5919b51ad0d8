//! Configuration and constants for the CLI and stats server.

use std::time::Duration;

/// Default host the stats server binds to
pub const DEFAULT_HOST: &str = "localhost";

/// Default port the stats server listens on
pub const DEFAULT_PORT: u16 = 8000;

/// Default timeout for report submissions to a remote stats server
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Current report schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Key under which the schema version is stored in persisted report files.
/// Mode keys are single characters, so this can never collide with one.
pub const VERSION_KEY: &str = "version";

/// Seconds between two consecutive stack samples, unless the telemetry
/// source reports its own interval
pub const DEFAULT_SAMPLE_INTERVAL: f64 = 0.001;

// Heatmap skip compression thresholds.
// Runs of unexecuted lines longer than MIN_SKIP_RUN collapse into a
// skip marker, but only for sources of at least MIN_LINES_FOR_SKIPS
// lines - short files are always shown in full.
pub const MIN_SKIP_RUN: u32 = 10;
pub const MIN_LINES_FOR_SKIPS: u32 = 100;
