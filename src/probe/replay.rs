//! Replay telemetry sources backed by a recorded dump.
//!
//! A telemetry dump is a single JSON document holding everything the
//! instrumentation observed during one target run. Out-of-process
//! collectors write dumps; the aggregation pipeline replays them
//! through the same source traits a live collector would implement,
//! so recorded and live runs take an identical path through the
//! engine.

use super::{
    CallGraph, CallSource, HeapSnapshot, HeapSource, LineEvent, LineSource, MemoryEvent,
    ProfileTarget, SampleSet, SampleSource, TargetRunner,
};
use crate::utils::error::TargetError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Recorded telemetry streams for one target run.
///
/// Every stream is optional; a dump only carries what its collector
/// was asked to observe. Replaying a mode whose stream is absent
/// fails with [`TargetError::MissingStream`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryDump {
    /// Target the streams were recorded from
    pub target: ProfileTarget,

    #[serde(default)]
    pub calls: Option<CallGraph>,

    #[serde(default)]
    pub samples: Option<SampleSet>,

    #[serde(default)]
    pub lines: Option<Vec<LineEvent>>,

    #[serde(default)]
    pub heap: Option<HeapStream>,
}

/// Heap stream: snapshots taken around the run plus per-line readings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapStream {
    pub before: HeapSnapshot,
    pub after: HeapSnapshot,
    pub events: Vec<MemoryEvent>,

    /// Collector bookkeeping objects, subtracted from the delta
    #[serde(default)]
    pub overhead: HeapSnapshot,

    /// Type label of the container the before-snapshot is retained in
    #[serde(default = "default_container_label")]
    pub container_label: String,
}

fn default_container_label() -> String {
    "list".to_string()
}

impl TelemetryDump {
    /// Load a dump from a JSON file
    ///
    /// **Public** - called by the run command
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TargetError> {
        let path = path.as_ref();
        debug!("Loading telemetry dump from: {}", path.display());

        let file = File::open(path)?;
        let dump: TelemetryDump = serde_json::from_reader(BufReader::new(file))?;

        debug!(
            "Dump loaded: calls={} samples={} lines={} heap={}",
            dump.calls.is_some(),
            dump.samples.is_some(),
            dump.lines.is_some(),
            dump.heap.is_some()
        );
        Ok(dump)
    }
}

/// Call-graph source that replays a recorded stream
pub struct ReplayCallSource {
    graph: Option<CallGraph>,
}

impl ReplayCallSource {
    pub fn new(graph: Option<CallGraph>) -> Self {
        Self { graph }
    }
}

impl CallSource for ReplayCallSource {
    fn start(&mut self) -> Result<(), TargetError> {
        if self.graph.is_none() {
            return Err(TargetError::MissingStream("calls"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<CallGraph, TargetError> {
        self.graph.take().ok_or(TargetError::MissingStream("calls"))
    }
}

/// Stack sampler that replays a recorded stream
pub struct ReplaySampleSource {
    set: Option<SampleSet>,
    interval: f64,
}

impl ReplaySampleSource {
    pub fn new(set: Option<SampleSet>) -> Self {
        let interval = set
            .as_ref()
            .map(|s| s.interval)
            .unwrap_or(crate::utils::config::DEFAULT_SAMPLE_INTERVAL);
        Self { set, interval }
    }
}

impl SampleSource for ReplaySampleSource {
    fn interval(&self) -> f64 {
        self.interval
    }

    fn start(&mut self) -> Result<(), TargetError> {
        if self.set.is_none() {
            return Err(TargetError::MissingStream("samples"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<SampleSet, TargetError> {
        self.set.take().ok_or(TargetError::MissingStream("samples"))
    }
}

/// Line-timing source that replays a recorded stream
pub struct ReplayLineSource {
    events: Option<Vec<LineEvent>>,
}

impl ReplayLineSource {
    pub fn new(events: Option<Vec<LineEvent>>) -> Self {
        Self { events }
    }
}

impl LineSource for ReplayLineSource {
    fn start(&mut self) -> Result<(), TargetError> {
        if self.events.is_none() {
            return Err(TargetError::MissingStream("lines"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<LineEvent>, TargetError> {
        self.events.take().ok_or(TargetError::MissingStream("lines"))
    }
}

/// Heap source that replays a recorded stream.
///
/// The first `snapshot` call returns the recorded before-state, every
/// later call the recorded after-state, mirroring how the memory
/// aggregator brackets a live run.
pub struct ReplayHeapSource {
    stream: Option<HeapStream>,
    snapshots_taken: u32,
}

impl ReplayHeapSource {
    pub fn new(stream: Option<HeapStream>) -> Self {
        Self {
            stream,
            snapshots_taken: 0,
        }
    }
}

impl HeapSource for ReplayHeapSource {
    fn snapshot(&mut self) -> Result<HeapSnapshot, TargetError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or(TargetError::MissingStream("heap"))?;
        self.snapshots_taken += 1;
        if self.snapshots_taken == 1 {
            Ok(stream.before.clone())
        } else {
            Ok(stream.after.clone())
        }
    }

    fn start(&mut self) -> Result<(), TargetError> {
        if self.stream.is_none() {
            return Err(TargetError::MissingStream("heap"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<MemoryEvent>, TargetError> {
        match self.stream.as_ref() {
            Some(stream) => Ok(stream.events.clone()),
            None => Err(TargetError::MissingStream("heap")),
        }
    }

    fn self_overhead(&self) -> HeapSnapshot {
        self.stream
            .as_ref()
            .map(|s| s.overhead.clone())
            .unwrap_or_default()
    }

    fn container_label(&self) -> &str {
        self.stream
            .as_ref()
            .map(|s| s.container_label.as_str())
            .unwrap_or("list")
    }
}

/// Target runner for replay mode.
///
/// The run already happened when the dump was recorded, so there is
/// nothing to execute here.
pub struct ReplayRunner;

impl TargetRunner for ReplayRunner {
    fn run(&mut self, target: &ProfileTarget) -> Result<(), TargetError> {
        debug!("Replaying recorded run of {}", target.display_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FrameKey;
    use std::io::Write;

    fn sample_dump() -> TelemetryDump {
        TelemetryDump {
            target: ProfileTarget::Module {
                path: "app.py".into(),
                args: vec![],
            },
            calls: None,
            samples: Some(SampleSet {
                stacks: vec![crate::probe::SampledStack {
                    frames: vec![FrameKey::new("app.py", 10, "work")],
                    count: 4,
                }],
                run_time: 0.5,
                interval: 0.001,
            }),
            lines: None,
            heap: None,
        }
    }

    #[test]
    fn test_load_round_trip() {
        let dump = sample_dump();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&dump).unwrap().as_bytes())
            .unwrap();

        let loaded = TelemetryDump::load(file.path()).unwrap();
        assert_eq!(loaded.target, dump.target);
        assert!(loaded.samples.is_some());
        assert!(loaded.calls.is_none());
    }

    #[test]
    fn test_missing_stream_fails_on_start() {
        let mut source = ReplayCallSource::new(None);
        match source.start() {
            Err(TargetError::MissingStream(stream)) => assert_eq!(stream, "calls"),
            other => panic!("expected missing stream error, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_source_replays_once() {
        let dump = sample_dump();
        let mut source = ReplaySampleSource::new(dump.samples);

        source.start().unwrap();
        let set = source.stop().unwrap();
        assert_eq!(set.stacks.len(), 1);
        assert_eq!(set.run_time, 0.5);

        // The stream is consumed; a second collection has nothing left.
        assert!(source.stop().is_err());
    }

    #[test]
    fn test_heap_source_snapshot_order() {
        let stream = HeapStream {
            before: HeapSnapshot::from_labels(["int"]),
            after: HeapSnapshot::from_labels(["int", "int"]),
            events: vec![],
            overhead: HeapSnapshot::default(),
            container_label: "list".to_string(),
        };
        let mut source = ReplayHeapSource::new(Some(stream));

        let before = source.snapshot().unwrap();
        let after = source.snapshot().unwrap();
        assert_eq!(before.count("int"), 1);
        assert_eq!(after.count("int"), 2);
    }
}
