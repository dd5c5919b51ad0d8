//! Report structure and per-mode payload schemas.
//!
//! Field names follow the wire format the browser visualization
//! consumes, hence the camelCase renames. The report itself is an
//! order-preserving map from mode letter to payload: modes appear in
//! the order they were assembled, and that order survives
//! serialization (`serde_json` is built with `preserve_order`).

use crate::utils::error::ReportError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The assembled, mode-keyed aggregation result.
///
/// Immutable once assembled; the stats server replaces its held
/// snapshot with a merged copy on submission rather than editing
/// payloads in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    modes: Map<String, Value>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mode payload. Re-inserting an existing mode overwrites
    /// its payload but keeps its position.
    pub fn insert(&mut self, mode: char, payload: Value) {
        self.modes.insert(mode.to_string(), payload);
    }

    pub fn get(&self, mode: char) -> Option<&Value> {
        self.modes.get(&mode.to_string())
    }

    pub fn contains(&self, mode: char) -> bool {
        self.modes.contains_key(&mode.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Mode keys in held order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.modes.keys().map(String::as_str)
    }

    /// Shallow merge: every key of `other` overwrites the same key
    /// here, existing keys keep their position, new keys append.
    pub fn merge(&mut self, other: Report) {
        for (key, value) in other.modes {
            self.modes.insert(key, value);
        }
    }

    /// Interpret a parsed JSON value as a report.
    ///
    /// Anything but an object is rejected; the merge contract is
    /// defined on objects only.
    pub fn from_value(value: Value) -> Result<Self, ReportError> {
        match value {
            Value::Object(modes) => Ok(Self { modes }),
            _ => Err(ReportError::NotAnObject),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.modes.clone())
    }

    /// Iterate held (mode, payload) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.modes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One node of a reconstructed call tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTreeNode {
    #[serde(rename = "moduleName")]
    pub module_name: String,

    pub lineno: u32,

    #[serde(rename = "funcName")]
    pub func_name: String,

    #[serde(rename = "primCalls")]
    pub prim_calls: u64,

    #[serde(rename = "totalCalls")]
    pub total_calls: u64,

    #[serde(rename = "timePerCall")]
    pub time_per_call: f64,

    #[serde(rename = "cumTime")]
    pub cum_time: f64,

    pub percentage: f64,

    pub children: Vec<CallTreeNode>,
}

impl CallTreeNode {
    /// Sentinel returned when there are no call records to build from
    pub fn empty() -> Self {
        Self {
            module_name: String::new(),
            lineno: 0,
            func_name: "<empty>".to_string(),
            prim_calls: 0,
            total_calls: 0,
            time_per_call: 0.0,
            cum_time: 0.0,
            percentage: 0.0,
            children: Vec::new(),
        }
    }
}

/// One node of a flame tree built from stack samples.
///
/// `stack` is the `(function, file, line)` triple the visualization
/// keys nodes by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameNode {
    pub stack: (String, String, u32),

    pub children: Vec<FlameNode>,

    #[serde(rename = "sampleCount")]
    pub sample_count: u64,

    #[serde(rename = "samplePercentage")]
    pub sample_percentage: f64,

    #[serde(rename = "colorHash")]
    pub color_hash: u32,
}

/// One tagged source line of a skip-compressed listing:
/// `["line", number, text]` or `["skip", count]`
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLine {
    Line { number: u32, text: String },
    Skip { count: u32 },
}

impl Serialize for SourceLine {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        match self {
            SourceLine::Line { number, text } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("line")?;
                seq.serialize_element(number)?;
                seq.serialize_element(text)?;
                seq.end()
            }
            SourceLine::Skip { count } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("skip")?;
                seq.serialize_element(count)?;
                seq.end()
            }
        }
    }
}

/// Heatmap for one source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeatmap {
    pub name: String,

    /// Line number to cumulative execution time, in seconds
    pub heatmap: BTreeMap<u32, f64>,

    /// Line number to execution count
    #[serde(rename = "executionCount")]
    pub execution_count: BTreeMap<u32, u64>,

    /// Skip-compressed source listing
    #[serde(rename = "srcCode")]
    pub src_code: Vec<SourceLine>,

    /// Total time attributed to this file, in seconds
    #[serde(rename = "runTime")]
    pub run_time: f64,
}

/// Payload for mode `c` (flame graph)
#[derive(Debug, Clone, Serialize)]
pub struct FlameReport {
    #[serde(rename = "objectName")]
    pub object_name: String,

    #[serde(rename = "sampleInterval")]
    pub sample_interval: f64,

    #[serde(rename = "runTime")]
    pub run_time: f64,

    /// Flame tree, or an empty object when no samples were collected
    #[serde(rename = "callStats")]
    pub call_stats: Value,

    #[serde(rename = "totalSamples")]
    pub total_samples: u64,

    pub timestamp: i64,
}

/// Payload for mode `p` (deterministic call profile)
#[derive(Debug, Clone, Serialize)]
pub struct CallTreeReport {
    #[serde(rename = "objectName")]
    pub object_name: String,

    #[serde(rename = "runTime")]
    pub run_time: f64,

    #[serde(rename = "primitiveCalls")]
    pub primitive_calls: u64,

    #[serde(rename = "totalCalls")]
    pub total_calls: u64,

    #[serde(rename = "callStats")]
    pub call_stats: CallTreeNode,

    pub timestamp: i64,
}

/// Payload for mode `h` (code heatmap)
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapReport {
    #[serde(rename = "objectName")]
    pub object_name: String,

    #[serde(rename = "runTime")]
    pub run_time: f64,

    pub heatmaps: Vec<FileHeatmap>,
}

/// Payload for mode `m` (memory profile)
#[derive(Debug, Clone, Serialize)]
pub struct MemoryReport {
    #[serde(rename = "objectName")]
    pub object_name: String,

    /// `[index, line, memMb, function, file]` rows, consecutive
    /// same-line readings collapsed to their peak
    #[serde(rename = "codeEvents")]
    pub code_events: Vec<(u64, u32, f64, String, String)>,

    #[serde(rename = "totalEvents")]
    pub total_events: u64,

    /// `[label, count]` pairs sorted by absolute count, descending
    #[serde(rename = "objectsCount")]
    pub objects_count: Vec<(String, i64)>,

    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_existing_modes() {
        let mut held = Report::new();
        held.insert('c', json!({"objectName": "app.py (module)"}));

        let mut incoming = Report::new();
        incoming.insert('m', json!({"totalEvents": 3}));

        held.merge(incoming);

        assert_eq!(held.len(), 2);
        assert_eq!(
            held.get('c'),
            Some(&json!({"objectName": "app.py (module)"}))
        );
        assert_eq!(held.get('m'), Some(&json!({"totalEvents": 3})));
    }

    #[test]
    fn test_merge_overwrites_same_mode_in_place() {
        let mut held = Report::new();
        held.insert('c', json!(1));
        held.insert('h', json!(2));

        let mut incoming = Report::new();
        incoming.insert('c', json!(3));
        held.merge(incoming);

        // Overwritten key keeps its original position.
        let keys: Vec<&str> = held.keys().collect();
        assert_eq!(keys, vec!["c", "h"]);
        assert_eq!(held.get('c'), Some(&json!(3)));
    }

    #[test]
    fn test_mode_order_survives_serialization() {
        let mut report = Report::new();
        report.insert('m', json!(1));
        report.insert('c', json!(2));
        report.insert('h', json!(3));

        let serialized = serde_json::to_string(&report).unwrap();
        assert_eq!(serialized, r#"{"m":1,"c":2,"h":3}"#);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Report::from_value(json!([1, 2, 3])).is_err());
        assert!(Report::from_value(json!("cmh")).is_err());
        assert!(Report::from_value(json!({})).is_ok());
    }

    #[test]
    fn test_source_line_wire_shape() {
        let line = SourceLine::Line {
            number: 7,
            text: "x = 1".to_string(),
        };
        let skip = SourceLine::Skip { count: 40 };

        assert_eq!(serde_json::to_value(&line).unwrap(), json!(["line", 7, "x = 1"]));
        assert_eq!(serde_json::to_value(&skip).unwrap(), json!(["skip", 40]));
    }

    #[test]
    fn test_empty_call_tree_sentinel() {
        let sentinel = CallTreeNode::empty();
        assert_eq!(sentinel.func_name, "<empty>");
        assert_eq!(sentinel.cum_time, 0.0);
        assert!(sentinel.children.is_empty());
    }
}
