//! Report file persistence with schema version stamping.
//!
//! Saved reports carry a top-level `version` key so a stats server
//! from a different release refuses them instead of rendering
//! garbage. The key lives beside the single-letter mode keys and can
//! never collide with one.

use crate::report::schema::Report;
use crate::utils::config::{SCHEMA_VERSION, VERSION_KEY};
use crate::utils::error::ReportError;
use log::{debug, info};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// **Public** - Writes a report to disk as pretty-printed JSON.
///
/// The schema version is stamped as the first key of the written
/// object; mode payloads follow in assembly order.
///
/// # Arguments
/// * `report` - The assembled report to persist
/// * `path` - Destination file path, overwritten if present
///
/// # Errors
/// Returns `ReportError::Io` when the file cannot be created and
/// `ReportError::Json` when serialization fails.
pub fn save_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    info!("Writing report to: {}", path.display());

    let mut stamped = Map::new();
    stamped.insert(
        VERSION_KEY.to_string(),
        Value::String(SCHEMA_VERSION.to_string()),
    );
    match report.to_value() {
        Value::Object(modes) => {
            for (key, value) in modes {
                stamped.insert(key, value);
            }
        }
        _ => return Err(ReportError::NotAnObject),
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(ReportError::Io)?;
        }
    }

    let file = File::create(path).map_err(ReportError::Io)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &Value::Object(stamped)).map_err(ReportError::Json)?;

    info!("Report written successfully ({} bytes)", file_size(path));
    Ok(())
}

/// **Private** - Size of a written file, zero when unreadable
fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// **Public** - Reads a report back from disk, checking its version.
///
/// # Arguments
/// * `path` - Path to a file previously written by `save_report`
///
/// # Errors
/// * `ReportError::Io` / `ReportError::Json` for unreadable or
///   malformed files
/// * `ReportError::NotAnObject` when the top level is not an object
/// * `ReportError::MissingVersion` when no `version` key is present
/// * `ReportError::VersionMismatch` when the stamp differs from this
///   build's schema version
pub fn load_report(path: &Path) -> Result<Report, ReportError> {
    debug!("Reading report from {}", path.display());

    let file = File::open(path).map_err(ReportError::Io)?;
    let reader = BufReader::new(file);
    let value: Value = serde_json::from_reader(reader).map_err(ReportError::Json)?;

    let stamped = match value {
        Value::Object(map) => map,
        _ => return Err(ReportError::NotAnObject),
    };

    // Split the version stamp from the mode keys without disturbing
    // their order.
    let mut version = None;
    let mut modes = Map::new();
    for (key, entry) in stamped {
        if key == VERSION_KEY {
            version = Some(entry);
        } else {
            modes.insert(key, entry);
        }
    }

    let found = match version {
        Some(Value::String(tag)) => tag,
        Some(other) => other.to_string(),
        None => return Err(ReportError::MissingVersion),
    };
    if found != SCHEMA_VERSION {
        return Err(ReportError::VersionMismatch {
            expected: SCHEMA_VERSION.to_string(),
            found,
        });
    }

    debug!("Report holds {} mode(s)", modes.len());
    Report::from_value(Value::Object(modes))
}
