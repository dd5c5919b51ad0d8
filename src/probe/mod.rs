//! Profile targets and the telemetry sources that observe them.
//!
//! Aggregators never talk to a runtime hook mechanism directly. They
//! depend on the source traits defined here, which carry an explicit
//! `start`/`stop` lifecycle: `start` installs whatever hook the host
//! runtime provides, `stop` collects the observed stream and must
//! restore the hook that was active before `start`. Aggregators call
//! `stop` even when the target run failed, so a failing run never
//! leaks an installed hook.
//!
//! The only source implementations in this crate replay recorded
//! telemetry (see [`replay`]); live instrumentation is supplied by
//! host-runtime-specific collectors out of process.

pub mod replay;

use crate::utils::error::TargetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use replay::{HeapStream, ReplayCallSource, ReplayHeapSource, ReplayLineSource,
                 ReplayRunner, ReplaySampleSource, TelemetryDump};

/// A single code location: file, line and function name.
///
/// Used as the identity of call records and sampled stack frames.
/// Ordering is lexicographic over (file, line, function) and gives
/// deterministic tie-breaks wherever frames are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameKey {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl FrameKey {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }
}

/// Flat call statistics for one code location, as produced by a
/// deterministic call profiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Location this record describes
    pub frame: FrameKey,

    /// Calls that were not recursive re-entries
    pub primitive_calls: u64,

    /// All calls, including recursive re-entries
    pub total_calls: u64,

    /// Time spent in the function itself, in seconds
    pub time_per_call: f64,

    /// Time spent in the function and everything it called, in seconds
    pub cumulative_time: f64,

    /// Locations this function was called from. Treated as a set;
    /// duplicate entries are collapsed during tree construction.
    #[serde(default)]
    pub callers: Vec<FrameKey>,
}

/// Everything a call-graph source observed during one target run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraph {
    pub records: Vec<CallRecord>,
    pub total_time: f64,
    pub primitive_calls: u64,
    pub total_calls: u64,
}

/// One distinct call stack with the number of times the sampler saw it.
///
/// Frames are ordered innermost first, the way a sampler unwinds them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledStack {
    pub frames: Vec<FrameKey>,
    pub count: u64,
}

/// Everything a sampling source observed during one target run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSet {
    pub stacks: Vec<SampledStack>,
    pub run_time: f64,
    #[serde(default = "default_sample_interval")]
    pub interval: f64,
}

impl Default for SampleSet {
    fn default() -> Self {
        Self {
            stacks: Vec::new(),
            run_time: 0.0,
            interval: default_sample_interval(),
        }
    }
}

fn default_sample_interval() -> f64 {
    crate::utils::config::DEFAULT_SAMPLE_INTERVAL
}

/// A single line execution observed by a line source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineEvent {
    pub file: String,
    pub line: u32,
    /// Time attributed to this execution of the line, in seconds
    pub seconds: f64,
}

/// A single memory reading taken while the target ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub line: u32,
    pub mem_mb: f64,
    pub function: String,
    pub file: String,
}

/// Counts of live objects by type label at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    pub objects: BTreeMap<String, i64>,
}

impl HeapSnapshot {
    /// Build a snapshot by counting a stream of type labels
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut objects = BTreeMap::new();
        for label in labels {
            *objects.entry(label.into()).or_insert(0) += 1;
        }
        Self { objects }
    }

    pub fn count(&self, label: &str) -> i64 {
        self.objects.get(label).copied().unwrap_or(0)
    }
}

/// What gets profiled: a single function, a script file, or a
/// package directory.
///
/// Resolved once from the command line; aggregators match over the
/// tag instead of re-inspecting the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileTarget {
    Function { name: String, file: String },
    Module { path: PathBuf, args: Vec<String> },
    Package { path: PathBuf, args: Vec<String> },
}

impl ProfileTarget {
    /// Split a target spec like `"path/to/app arg1 arg2"` into a path
    /// and its arguments, and classify the path: a directory is a
    /// package, anything else is a module.
    ///
    /// **Public** - called by the run command with the CLI target spec
    pub fn resolve(spec: &str) -> Result<Self, TargetError> {
        let mut parts = spec.split_whitespace();
        let path = match parts.next() {
            Some(path) => PathBuf::from(path),
            None => return Err(TargetError::NotFound("empty target spec".to_string())),
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        if path.is_dir() {
            Ok(ProfileTarget::Package { path, args })
        } else {
            Ok(ProfileTarget::Module { path, args })
        }
    }

    /// Label shown in report headers, e.g. `"app.py (module)"`
    pub fn display_name(&self) -> String {
        match self {
            ProfileTarget::Function { name, file } => {
                format!("{} @ {} (function)", name, file)
            }
            ProfileTarget::Module { path, .. } => format!("{} (module)", path.display()),
            ProfileTarget::Package { path, .. } => format!("{} (package)", path.display()),
        }
    }
}

/// Observes exact call records during a target run.
///
/// `stop` must restore whatever call hook was installed before
/// `start`, and is called even when the run between them failed.
pub trait CallSource {
    fn start(&mut self) -> Result<(), TargetError>;
    fn stop(&mut self) -> Result<CallGraph, TargetError>;
}

/// Samples call stacks at a fixed interval during a target run.
///
/// Same hook save/restore contract as [`CallSource`].
pub trait SampleSource {
    /// Seconds between two consecutive samples
    fn interval(&self) -> f64;
    fn start(&mut self) -> Result<(), TargetError>;
    fn stop(&mut self) -> Result<SampleSet, TargetError>;
}

/// Observes per-line execution timings during a target run.
///
/// Same hook save/restore contract as [`CallSource`].
pub trait LineSource {
    fn start(&mut self) -> Result<(), TargetError>;
    fn stop(&mut self) -> Result<Vec<LineEvent>, TargetError>;
}

/// Observes heap state around and during a target run.
///
/// `snapshot` may be called while the source is stopped; the memory
/// aggregator takes one snapshot before `start` and one after `stop`.
pub trait HeapSource {
    /// Live object counts right now
    fn snapshot(&mut self) -> Result<HeapSnapshot, TargetError>;

    fn start(&mut self) -> Result<(), TargetError>;
    fn stop(&mut self) -> Result<Vec<MemoryEvent>, TargetError>;

    /// Objects that exist only because the source itself is alive.
    /// Subtracted from snapshot deltas so the source does not show up
    /// in its own report.
    fn self_overhead(&self) -> HeapSnapshot;

    /// Type label of the container the before-snapshot is retained in
    fn container_label(&self) -> &str;
}

/// Executes a profile target to completion on the calling thread.
///
/// Target errors propagate; an aggregator still collects its sources
/// before surfacing them.
pub trait TargetRunner {
    fn run(&mut self, target: &ProfileTarget) -> Result<(), TargetError>;
}
