//! Run command implementation.
//!
//! The run command:
//! 1. Loads a recorded telemetry dump
//! 2. Resolves the profile target
//! 3. Runs the requested aggregators and assembles their report
//! 4. Writes the report to a file or submits it to a running stats
//!    server

use crate::aggregator::{
    assemble, CallTreeAggregator, FlameAggregator, HeatmapAggregator, MemoryAggregator,
    ModeRegistry,
};
use crate::probe::{
    ProfileTarget, ReplayCallSource, ReplayHeapSource, ReplayLineSource, ReplayRunner,
    ReplaySampleSource, TelemetryDump,
};
use crate::report::save_report;
use crate::server::StatsClient;
use crate::utils::config::{DEFAULT_HOST, DEFAULT_PORT};
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the run command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Mode configuration string, e.g. "cmh"
    pub config: String,

    /// Path to the recorded telemetry dump
    pub telemetry: PathBuf,

    /// Override for the target recorded in the dump
    pub target: Option<String>,

    /// Output path for the report JSON
    pub output: PathBuf,

    /// Submit to a running stats server instead of writing a file
    pub remote: bool,

    /// Stats server host for remote submission
    pub host: String,

    /// Stats server port for remote submission
    pub port: u16,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: String::new(),
            telemetry: PathBuf::from("telemetry.json"),
            target: None,
            output: PathBuf::from("report.json"),
            remote: false,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Execute the run command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Run command arguments
///
/// # Returns
/// Ok if the report was assembled and delivered, Err with context if
/// any step fails
///
/// # Errors
/// * Invalid mode configuration (duplicate or unknown mode letters)
/// * Missing or malformed telemetry dump
/// * Aggregator failures, including missing telemetry streams
/// * File write or submission errors
///
/// # Example
/// ```ignore
/// let args = RunArgs {
///     config: "cmh".to_string(),
///     telemetry: PathBuf::from("telemetry.json"),
///     output: PathBuf::from("report.json"),
///     ..Default::default()
/// };
///
/// execute_run(args)?;
/// ```
pub fn execute_run(args: RunArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Starting aggregation with mode configuration: {}", args.config);

    // Step 1: Load telemetry
    info!("Step 1/4: Loading telemetry dump...");
    let dump = TelemetryDump::load(&args.telemetry)
        .with_context(|| format!("Failed to load telemetry dump {}", args.telemetry.display()))?;

    // Step 2: Resolve target
    info!("Step 2/4: Resolving profile target...");
    let target = match &args.target {
        Some(spec) => ProfileTarget::resolve(spec)?,
        None => dump.target.clone(),
    };
    info!("Profiling target: {}", target.display_name());

    // Step 3: Run aggregators
    info!("Step 3/4: Running aggregators...");
    let registry = build_replay_registry(&dump);
    let report = assemble(&target, &args.config, &registry)?;
    debug!("Assembled report with {} mode payload(s)", report.len());

    // Step 4: Deliver
    if args.remote {
        info!(
            "Step 4/4: Submitting report to {}:{}...",
            args.host, args.port
        );
        let client = StatsClient::new(&args.host, args.port)?;
        client
            .submit_report(&report)
            .context("Failed to submit report to stats server")?;
        info!("✓ Report submitted to http://{}:{}", args.host, args.port);
    } else {
        info!("Step 4/4: Writing report...");
        save_report(&report, &args.output)
            .with_context(|| format!("Failed to write report {}", args.output.display()))?;
        info!("✓ Report written to: {}", args.output.display());
    }

    let elapsed = start_time.elapsed();
    info!("Aggregation completed in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

/// Build the mode registry over a telemetry dump
///
/// **Private** - the registry's run order (m, c, h, p) decides report
/// key order, whatever order the configuration string uses
fn build_replay_registry(dump: &TelemetryDump) -> ModeRegistry {
    let mut registry = ModeRegistry::new();

    let heap = dump.heap.clone();
    registry.register(
        'm',
        Box::new(move |target| {
            Box::new(MemoryAggregator::new(
                ReplayHeapSource::new(heap.clone()),
                ReplayRunner,
                target.clone(),
            ))
        }),
    );

    let samples = dump.samples.clone();
    registry.register(
        'c',
        Box::new(move |target| {
            Box::new(FlameAggregator::new(
                ReplaySampleSource::new(samples.clone()),
                ReplayRunner,
                target.clone(),
            ))
        }),
    );

    let lines = dump.lines.clone();
    registry.register(
        'h',
        Box::new(move |target| {
            Box::new(HeatmapAggregator::new(
                ReplayLineSource::new(lines.clone()),
                ReplayRunner,
                target.clone(),
            ))
        }),
    );

    let calls = dump.calls.clone();
    registry.register(
        'p',
        Box::new(move |target| {
            Box::new(CallTreeAggregator::new(
                ReplayCallSource::new(calls.clone()),
                ReplayRunner,
                target.clone(),
            ))
        }),
    );

    registry
}

/// Validate run arguments
///
/// **Public** - can be called before execute_run for early validation
///
/// # Arguments
/// * `args` - Arguments to validate
///
/// # Returns
/// Ok if arguments are valid, Err with message if not
pub fn validate_args(args: &RunArgs) -> Result<()> {
    if args.config.is_empty() {
        anyhow::bail!("Mode configuration cannot be empty");
    }

    if !args.config.chars().all(|mode| mode.is_ascii_alphabetic()) {
        anyhow::bail!("Mode configuration may only contain letters");
    }

    if args.remote && args.host.is_empty() {
        anyhow::bail!("Host cannot be empty for remote submission");
    }

    Ok(())
}
