//! Memory event collapsing and heap object deltas.
//!
//! Two independent results come out of one memory-profiled run:
//! 1. Code events: per-line memory readings, with consecutive
//!    readings of the same line collapsed while memory rises
//! 2. Objects count: the net change in live objects by type label,
//!    corrected for the objects the profiler itself keeps alive
//!
//! The correction exists because the heap source takes its before
//! snapshot while its own buffers are already allocated; without it,
//! every report would show the profiler's bookkeeping as leaked
//! objects of the target.

use crate::aggregator::assembler::Aggregator;
use crate::probe::{HeapSnapshot, HeapSource, MemoryEvent, ProfileTarget, TargetRunner};
use crate::report::MemoryReport;
use crate::utils::error::TargetError;
use chrono::Utc;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

/// Collapsed code event row: `(index, line, memMb, function, file)`
pub type CodeEventRow = (u64, u32, f64, String, String);

/// **Public** - Collapses a raw memory event stream for display.
///
/// Consecutive readings of the same `(line, function, file)` merge
/// into one row holding the peak memory, but only while memory rises:
/// a flat or falling reading on the same line starts a new row. Each
/// row keeps the 1-based index of the first raw event it covers, so
/// the x axis still reflects real event positions.
pub fn collapse_code_events(events: &[MemoryEvent]) -> Vec<CodeEventRow> {
    let mut collapsed: Vec<CodeEventRow> = Vec::new();
    for (index, event) in events.iter().enumerate() {
        match collapsed.last_mut() {
            Some(last)
                if last.1 == event.line
                    && last.3 == event.function
                    && last.4 == event.file
                    && last.2 < event.mem_mb =>
            {
                last.2 = event.mem_mb;
            }
            _ => collapsed.push((
                index as u64 + 1,
                event.line,
                event.mem_mb,
                event.function.clone(),
                event.file.clone(),
            )),
        }
    }
    collapsed
}

/// **Public** - Computes the net object count change between two heap
/// snapshots.
///
/// # Arguments
/// * `before` - Live object counts taken before the run
/// * `after` - Live object counts taken after the run
/// * `overhead` - Objects alive only because the heap source is
/// * `container_label` - Type label of the container the before
///   snapshot is retained in; one unit is subtracted for it, since
///   the after snapshot counts that container as a new object
///
/// # Returns
/// `(label, count)` pairs with zero-count labels dropped, sorted by
/// absolute count descending (ties by label)
pub fn object_delta(
    before: &HeapSnapshot,
    after: &HeapSnapshot,
    overhead: &HeapSnapshot,
    container_label: &str,
) -> Vec<(String, i64)> {
    let mut delta: BTreeMap<String, i64> = BTreeMap::new();
    for (label, count) in &after.objects {
        *delta.entry(label.clone()).or_insert(0) += count;
    }
    for (label, count) in &before.objects {
        *delta.entry(label.clone()).or_insert(0) -= count;
    }
    for (label, count) in &overhead.objects {
        *delta.entry(label.clone()).or_insert(0) -= count;
    }

    // Only corrects a container the snapshots actually saw; the
    // correction never manufactures a negative entry on its own.
    if let Some(count) = delta.get_mut(container_label) {
        *count -= 1;
    }

    let mut entries: Vec<(String, i64)> = delta
        .into_iter()
        .filter(|(_, count)| *count != 0)
        .collect();
    entries.sort_by(|a, b| b.1.abs().cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Aggregator for mode `m`: brackets the target run with heap
/// snapshots, traces per-line memory, and reports both.
pub struct MemoryAggregator<H, R> {
    source: H,
    runner: R,
    target: ProfileTarget,
}

impl<H: HeapSource, R: TargetRunner> MemoryAggregator<H, R> {
    pub fn new(source: H, runner: R, target: ProfileTarget) -> Self {
        Self {
            source,
            runner,
            target,
        }
    }
}

impl<H: HeapSource, R: TargetRunner> Aggregator for MemoryAggregator<H, R> {
    fn name(&self) -> &'static str {
        "MemoryAggregator"
    }

    fn run(&mut self) -> Result<Value, TargetError> {
        let before = self.source.snapshot()?;
        self.source.start()?;
        let run_result = self.runner.run(&self.target);
        let events = self.source.stop()?;
        let after = self.source.snapshot()?;
        run_result?;

        let code_events = collapse_code_events(&events);
        debug!(
            "Collapsed {} memory event(s) into {} row(s)",
            events.len(),
            code_events.len()
        );
        let objects_count = object_delta(
            &before,
            &after,
            &self.source.self_overhead(),
            self.source.container_label(),
        );

        let payload = MemoryReport {
            object_name: self.target.display_name(),
            total_events: code_events.len() as u64,
            code_events,
            objects_count,
            timestamp: Utc::now().timestamp(),
        };
        Ok(serde_json::to_value(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(line: u32, mem_mb: f64) -> MemoryEvent {
        MemoryEvent {
            line,
            mem_mb,
            function: "main".to_string(),
            file: "app.py".to_string(),
        }
    }

    fn snapshot(pairs: &[(&str, i64)]) -> HeapSnapshot {
        HeapSnapshot {
            objects: pairs
                .iter()
                .map(|(label, count)| (label.to_string(), *count))
                .collect(),
        }
    }

    #[test]
    fn test_collapse_code_events_keeps_peak_while_rising() {
        let events = vec![event(5, 10.0), event(5, 12.5), event(5, 12.75)];

        let rows = collapse_code_events(&events);

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            (1, 5, 12.75, "main".to_string(), "app.py".to_string())
        );
    }

    #[test]
    fn test_collapse_code_events_falling_memory_starts_new_row() {
        let events = vec![event(5, 12.5), event(5, 10.0)];

        let rows = collapse_code_events(&events);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].2, 12.5);
        assert_eq!(rows[1].0, 2);
        assert_eq!(rows[1].2, 10.0);
    }

    #[test]
    fn test_collapse_code_events_keeps_raw_indices() {
        let events = vec![
            event(1, 10.0),
            event(2, 10.5),
            event(2, 11.0),
            event(1, 11.0),
        ];

        let rows = collapse_code_events(&events);

        let indices: Vec<u64> = rows.iter().map(|row| row.0).collect();
        assert_eq!(indices, vec![1, 2, 4]);
        assert_eq!(rows[1].2, 11.0);
    }

    #[test]
    fn test_collapse_code_events_distinguishes_functions() {
        let mut second = event(5, 11.0);
        second.function = "helper".to_string();
        let events = vec![event(5, 10.0), second];

        let rows = collapse_code_events(&events);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_collapse_code_events_empty() {
        assert!(collapse_code_events(&[]).is_empty());
    }

    #[test]
    fn test_object_delta_nets_out_overhead_and_container() {
        let before = snapshot(&[("int", 5), ("str", 3)]);
        let after = snapshot(&[("int", 8), ("str", 3), ("dict", 1)]);
        let overhead = snapshot(&[("dict", 1)]);

        let delta = object_delta(&before, &after, &overhead, "list");

        assert_eq!(delta, vec![("int".to_string(), 3)]);
    }

    #[test]
    fn test_object_delta_subtracts_container_once() {
        let before = snapshot(&[]);
        let after = snapshot(&[("list", 1), ("int", 2)]);
        let overhead = snapshot(&[]);

        let delta = object_delta(&before, &after, &overhead, "list");

        // The single new list is the snapshot container itself.
        assert_eq!(delta, vec![("int".to_string(), 2)]);
    }

    #[test]
    fn test_object_delta_sorts_by_absolute_count() {
        let before = snapshot(&[("str", 5)]);
        let after = snapshot(&[("int", 3), ("tuple", 2)]);
        let overhead = snapshot(&[]);

        let delta = object_delta(&before, &after, &overhead, "list");

        assert_eq!(
            delta,
            vec![
                ("str".to_string(), -5),
                ("int".to_string(), 3),
                ("tuple".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_object_delta_ties_break_by_label() {
        let before = snapshot(&[]);
        let after = snapshot(&[("tuple", 2), ("dict", 2)]);
        let overhead = snapshot(&[]);

        let delta = object_delta(&before, &after, &overhead, "list");

        assert_eq!(
            delta,
            vec![("dict".to_string(), 2), ("tuple".to_string(), 2)]
        );
    }

    #[test]
    fn test_object_delta_empty_snapshots() {
        let empty = HeapSnapshot::default();
        assert!(object_delta(&empty, &empty, &empty, "list").is_empty());
    }
}
