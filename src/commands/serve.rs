//! Serve command implementation.
//!
//! The serve command:
//! 1. Loads a persisted report, when one is given
//! 2. Starts the stats server on the configured host and port
//!
//! The server then runs until the process is stopped. Starting with
//! no report is valid: the server holds an empty report and fills up
//! through submissions.

use crate::report::{load_report, Report};
use crate::server::{serve, AssetDir, ServerState};
use crate::utils::config::{DEFAULT_HOST, DEFAULT_PORT};
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the serve command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ServeArgs {
    /// Persisted report to serve, if any
    pub input: Option<PathBuf>,

    /// Host to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory the visualization assets are served from
    pub assets: PathBuf,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            input: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            assets: PathBuf::from("frontend"),
        }
    }
}

/// Execute the serve command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Serve command arguments
///
/// # Returns
/// Only returns on failure; a healthy server runs until the process
/// is stopped
///
/// # Errors
/// * Unreadable or version-mismatched report files
/// * Bind failures on the configured host and port
pub fn execute_serve(args: ServeArgs) -> Result<()> {
    if args.host.is_empty() {
        anyhow::bail!("Host cannot be empty");
    }

    // Step 1: Prepare the report
    info!("Step 1/2: Preparing report...");
    let report = match &args.input {
        Some(path) => {
            let report = load_report(path)
                .with_context(|| format!("Failed to load report {}", path.display()))?;
            info!("Loaded report with {} mode(s)", report.len());
            report
        }
        None => {
            info!("No report file given, starting empty");
            Report::new()
        }
    };

    let state = Arc::new(ServerState::new(report, AssetDir::new(&args.assets)));

    // Step 2: Run the server
    info!("Step 2/2: Starting stats server...");
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(serve(&args.host, args.port, state))
        .context("Stats server failed")?;

    Ok(())
}
