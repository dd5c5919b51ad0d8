//! profviz CLI
//!
//! A profiling telemetry aggregation engine. Replays recorded telemetry
//! dumps into renderable reports and serves them to the interactive web
//! visualization.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::process;

use profviz::commands::{execute_run, execute_serve, validate_args, RunArgs, ServeArgs};
use profviz::report::load_report;
use profviz::utils::config::SCHEMA_VERSION;
use profviz::utils::error::{AssembleError, ConfigError, ReportError, TargetError};

/// profviz - Profiling telemetry aggregation and visualization
#[derive(Parser, Debug)]
#[command(name = "profviz")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate a recorded telemetry dump into a report
    Run {
        /// Mode configuration (c: flame graph, m: memory, h: heatmap, p: call profile)
        #[arg(short, long)]
        config: String,

        /// Path to the recorded telemetry dump
        #[arg(short, long, default_value = "telemetry.json")]
        telemetry: PathBuf,

        /// Override the profile target recorded in the dump
        #[arg(long)]
        target: Option<String>,

        /// Output path for the report JSON
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Submit the report to a running stats server instead of writing a file
        #[arg(short, long)]
        remote: bool,

        /// Stats server host for remote submission
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Stats server port for remote submission
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Serve a report with the interactive web visualization
    Serve {
        /// Persisted report to preload (the server starts empty without it)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Host to bind the stats server to
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Directory the visualization assets are served from
        #[arg(long, default_value = "frontend")]
        assets: PathBuf,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    if let Err(error) = dispatch(cli.command) {
        eprintln!("Error: {:#}", error);
        process::exit(exit_code_for(&error));
    }
}

/// Route the parsed subcommand to its implementation
///
/// **Private** - internal command dispatch
fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            telemetry,
            target,
            output,
            remote,
            host,
            port,
        } => {
            let args = RunArgs {
                config,
                telemetry,
                target,
                output,
                remote,
                host,
                port,
            };

            // Validate args first
            validate_args(&args)?;

            execute_run(args)?;
        }

        Commands::Serve {
            input,
            host,
            port,
            assets,
        } => {
            execute_serve(ServeArgs {
                input,
                host,
                port,
                assets,
            })?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

/// Map an error to the exit code of its failure class
///
/// **Private** - ambiguous mode configurations exit with 1, unknown
/// modes with 2, target and aggregator failures with 3, report file
/// problems with 4, version mismatches with 5
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(assemble) = error.downcast_ref::<AssembleError>() {
        return match assemble {
            AssembleError::Config(ConfigError::AmbiguousModes(_)) => 1,
            AssembleError::Config(ConfigError::UnknownMode(_)) => 2,
            AssembleError::Aggregator { .. } => 3,
        };
    }

    if error.downcast_ref::<TargetError>().is_some() {
        return 3;
    }

    if let Some(report) = error.downcast_ref::<ReportError>() {
        return match report {
            ReportError::VersionMismatch { .. } => 5,
            _ => 4,
        };
    }

    1
}

/// Validate a report JSON file
///
/// **Private** - internal command implementation
fn validate_report_file(file_path: PathBuf) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let report = load_report(&file_path)?;
    let modes: Vec<&str> = report.keys().collect();

    println!("✓ Valid report");
    println!("  Schema Version: {}", SCHEMA_VERSION);
    println!("  Modes: {}", report.len());
    if !modes.is_empty() {
        println!("  Configuration: {}", modes.join(""));
    }

    Ok(())
}

/// Display version information
///
/// **Private** - internal command implementation
fn display_version() {
    println!("profviz v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("A profiling telemetry aggregation engine with a web visualization.");
    println!("https://github.com/your-org/profviz");
}
