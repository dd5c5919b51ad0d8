//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the library components to perform user tasks.

pub mod run;
pub mod serve;

// Re-export main command functions
pub use run::{execute_run, validate_args, RunArgs};
pub use serve::{execute_serve, ServeArgs};
