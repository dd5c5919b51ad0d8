//! Per-file heatmaps with skip-compressed source listings.
//!
//! Line events fold into two per-file maps (line to cumulative time,
//! line to execution count). The source listing that accompanies them
//! is bounded with a skip map: for large files, runs of unexecuted
//! lines collapse into `["skip", n]` markers so a heatmap payload
//! never grows with the size of cold code.
//!
//! Skip map coordinates are 1-based line numbers; `(start, length)`
//! means "after line `start`, `length` lines are omitted".

use crate::aggregator::assembler::Aggregator;
use crate::aggregator::round_decimals;
use crate::probe::{LineEvent, LineSource, ProfileTarget, TargetRunner};
use crate::report::{FileHeatmap, HeatmapReport, SourceLine};
use crate::utils::config::{MIN_LINES_FOR_SKIPS, MIN_SKIP_RUN};
use crate::utils::error::TargetError;
use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

/// **Public** - Computes the skip map for one source file.
///
/// Walks the hit lines in ascending order and records every gap
/// longer than `min_skip_region`, including the tail between the last
/// hit line and the end of the file. Files shorter than
/// `min_file_size` lines are never compressed.
///
/// # Arguments
/// * `hit_lines` - 1-based numbers of the lines that executed
/// * `total_lines` - Number of lines in the file
/// * `min_skip_region` - Smallest gap worth collapsing
/// * `min_file_size` - Smallest file worth compressing
///
/// # Returns
/// `(start, length)` pairs in ascending start order
pub fn compute_skip_map(
    hit_lines: &BTreeSet<u32>,
    total_lines: u32,
    min_skip_region: u32,
    min_file_size: u32,
) -> Vec<(u32, u32)> {
    if total_lines < min_file_size {
        return Vec::new();
    }

    // The end of the file acts as one more boundary, so the trailing
    // gap falls out of the same rule as the interior ones.
    let mut skips = Vec::new();
    let mut prev = 0u32;
    for &line in hit_lines.iter().chain(std::iter::once(&total_lines)) {
        let gap = line.saturating_sub(prev).saturating_sub(1);
        if gap > min_skip_region {
            skips.push((prev, gap));
        }
        prev = line;
    }
    skips
}

/// **Public** - Expands source lines through a skip map into the
/// tagged listing a report carries.
///
/// Each element is either a `["line", number, text]` entry with its
/// original 1-based number or a `["skip", count]` marker. Two skip
/// markers never end up adjacent: a region that emits no lines merges
/// into the marker before it.
pub fn apply_skip_map(source_lines: &[String], skip_map: &[(u32, u32)]) -> Vec<SourceLine> {
    let mut tagged = Vec::new();
    let mut cursor = 0usize;

    for &(start, length) in skip_map {
        let upto = (start as usize).min(source_lines.len());
        while cursor < upto {
            tagged.push(SourceLine::Line {
                number: cursor as u32 + 1,
                text: source_lines[cursor].clone(),
            });
            cursor += 1;
        }
        match tagged.last_mut() {
            Some(SourceLine::Skip { count }) => *count += length,
            _ => tagged.push(SourceLine::Skip { count: length }),
        }
        cursor = start as usize + length as usize;
    }

    for index in cursor..source_lines.len() {
        tagged.push(SourceLine::Line {
            number: index as u32 + 1,
            text: source_lines[index].clone(),
        });
    }
    tagged
}

/// **Public** - Folds line events into one heatmap per source file.
///
/// Files are read from disk to attach their listing; a file that
/// cannot be read is dropped from the result rather than failing the
/// whole report. Heatmaps come out sorted by file name.
pub fn build_file_heatmaps(
    events: &[LineEvent],
    min_skip_region: u32,
    min_file_size: u32,
) -> Vec<FileHeatmap> {
    let mut per_file: BTreeMap<&str, (BTreeMap<u32, f64>, BTreeMap<u32, u64>)> = BTreeMap::new();
    for event in events {
        let (times, counts) = per_file.entry(event.file.as_str()).or_default();
        *times.entry(event.line).or_insert(0.0) += event.seconds;
        *counts.entry(event.line).or_insert(0) += 1;
    }

    let mut heatmaps = Vec::new();
    for (file, (heatmap, execution_count)) in per_file {
        let source = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(err) => {
                debug!("Skipping unreadable source {}: {}", file, err);
                continue;
            }
        };
        let source_lines: Vec<String> = source.split('\n').map(str::to_string).collect();
        let total_lines = source_lines.len() as u32;

        let hit_lines: BTreeSet<u32> = heatmap.keys().copied().collect();
        let skip_map = compute_skip_map(&hit_lines, total_lines, min_skip_region, min_file_size);
        let src_code = apply_skip_map(&source_lines, &skip_map);
        let run_time = round_decimals(heatmap.values().sum::<f64>(), 6);

        heatmaps.push(FileHeatmap {
            name: file.to_string(),
            heatmap,
            execution_count,
            src_code,
            run_time,
        });
    }

    debug!("Built {} file heatmap(s)", heatmaps.len());
    heatmaps
}

/// Aggregator for mode `h`: runs the target under a line tracer and
/// reports per-file heatmaps.
pub struct HeatmapAggregator<L, R> {
    source: L,
    runner: R,
    target: ProfileTarget,
}

impl<L: LineSource, R: TargetRunner> HeatmapAggregator<L, R> {
    pub fn new(source: L, runner: R, target: ProfileTarget) -> Self {
        Self {
            source,
            runner,
            target,
        }
    }
}

impl<L: LineSource, R: TargetRunner> Aggregator for HeatmapAggregator<L, R> {
    fn name(&self) -> &'static str {
        "HeatmapAggregator"
    }

    fn run(&mut self) -> Result<Value, TargetError> {
        self.source.start()?;
        let run_result = self.runner.run(&self.target);
        let events = self.source.stop()?;
        run_result?;

        let heatmaps = build_file_heatmaps(&events, MIN_SKIP_RUN, MIN_LINES_FOR_SKIPS);
        let run_time = round_decimals(events.iter().map(|event| event.seconds).sum(), 6);

        let payload = HeatmapReport {
            object_name: self.target.display_name(),
            run_time,
            heatmaps,
        };
        Ok(serde_json::to_value(payload)?)
    }
}
