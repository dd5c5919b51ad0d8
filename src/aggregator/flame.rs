//! Flame tree construction from statistical stack samples.
//!
//! Building happens in three passes:
//! 1. Insert every sampled stack under a synthetic root, outermost
//!    frame first, creating missing nodes on the way down; the leaf
//!    takes the stack's sample weight
//! 2. Fill counts postorder, so every node holds its own weight plus
//!    the sum of its children's
//! 3. Annotate each node with its share of the filled total and a
//!    stable color hash of `"<function> @ <file>"`
//!
//! The synthetic root never reaches the report. Its first child is
//! the reported root; samples share one outermost frame (the target
//! entry point), so in practice there is exactly one.

use crate::aggregator::assembler::Aggregator;
use crate::aggregator::round_decimals;
use crate::probe::{FrameKey, ProfileTarget, SampleSource, SampledStack, TargetRunner};
use crate::report::{FlameNode, FlameReport};
use crate::utils::error::TargetError;
use chrono::Utc;
use log::debug;
use serde_json::{json, Value};

/// **Public** - Builds the flame tree for a set of sampled stacks.
///
/// # Arguments
/// * `stacks` - Distinct sampled stacks with their sample weights,
///   frames ordered innermost first
///
/// # Returns
/// The reported root, annotated with percentages and color hashes,
/// or `None` when no stacks were sampled
pub fn build_flame_tree(stacks: &[SampledStack]) -> Option<FlameNode> {
    let mut root = new_node("base", "", 0);
    for stack in stacks {
        let outermost_first: Vec<&FrameKey> = stack.frames.iter().rev().collect();
        insert_stack(&mut root, &outermost_first, stack.count);
    }

    let total_samples = fill_sample_counts(&mut root);
    debug!(
        "Flame tree built from {} stack(s), {} sample(s)",
        stacks.len(),
        total_samples
    );

    let mut reported = match root.children.into_iter().next() {
        Some(child) => child,
        None => return None,
    };
    annotate(&mut reported, total_samples);
    Some(reported)
}

fn new_node(function: &str, file: &str, line: u32) -> FlameNode {
    FlameNode {
        stack: (function.to_string(), file.to_string(), line),
        children: Vec::new(),
        sample_count: 0,
        sample_percentage: 0.0,
        color_hash: 0,
    }
}

/// **Private** - Walks one stack down the tree, creating missing
/// nodes, and writes the stack's weight at the leaf.
///
/// An empty frame slice means the walk has arrived: the current node
/// is the leaf and takes the weight. Re-inserting a stack overwrites
/// the weight written before (last write wins).
fn insert_stack(node: &mut FlameNode, frames: &[&FrameKey], weight: u64) {
    if let Some((first, rest)) = frames.split_first() {
        let position = node.children.iter().position(|child| {
            child.stack.0 == first.function
                && child.stack.1 == first.file
                && child.stack.2 == first.line
        });
        let child = match position {
            Some(index) => &mut node.children[index],
            None => {
                node.children
                    .push(new_node(&first.function, &first.file, first.line));
                let last = node.children.len() - 1;
                &mut node.children[last]
            }
        };
        insert_stack(child, rest, weight);
    } else {
        node.sample_count = weight;
    }
}

/// **Private** - Postorder count fill: adds every child's filled
/// count to its parent and returns the node's filled count.
fn fill_sample_counts(node: &mut FlameNode) -> u64 {
    let mut children_total = 0;
    for child in &mut node.children {
        children_total += fill_sample_counts(child);
    }
    node.sample_count += children_total;
    node.sample_count
}

/// **Private** - Fills percentages and color hashes across the tree.
///
/// Percentages are relative to the synthetic root's filled total, so
/// they stay consistent even when sampling caught frames outside the
/// reported root.
fn annotate(node: &mut FlameNode, total_samples: u64) {
    node.sample_percentage = if total_samples != 0 {
        round_decimals(100.0 * node.sample_count as f64 / total_samples as f64, 3)
    } else {
        0.0
    };
    node.color_hash = color_hash(&node.stack.0, &node.stack.1);
    for child in &mut node.children {
        annotate(child, total_samples);
    }
}

/// **Private** - Stable 32-bit color key for one frame.
///
/// Adler-32 over `"<function> @ <file>"`. The exact algorithm only
/// matters in that it never changes between runs, so equal frames
/// always render in the same color.
fn color_hash(function: &str, file: &str) -> u32 {
    adler32(&format!("{} @ {}", function, file))
}

/// **Private** - Adler-32 checksum
fn adler32(text: &str) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for byte in text.as_bytes() {
        a = (a + u32::from(*byte)) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

/// Aggregator for mode `c`: runs the target under a statistical stack
/// sampler and reports the flame tree.
pub struct FlameAggregator<S, R> {
    source: S,
    runner: R,
    target: ProfileTarget,
}

impl<S: SampleSource, R: TargetRunner> FlameAggregator<S, R> {
    pub fn new(source: S, runner: R, target: ProfileTarget) -> Self {
        Self {
            source,
            runner,
            target,
        }
    }
}

impl<S: SampleSource, R: TargetRunner> Aggregator for FlameAggregator<S, R> {
    fn name(&self) -> &'static str {
        "FlameAggregator"
    }

    fn run(&mut self) -> Result<Value, TargetError> {
        self.source.start()?;
        let run_result = self.runner.run(&self.target);
        let samples = self.source.stop()?;
        run_result?;

        let tree = build_flame_tree(&samples.stacks);
        let total_samples = match &tree {
            Some(node) => node.sample_count,
            None => 0,
        };
        let call_stats = match tree {
            Some(node) => serde_json::to_value(node)?,
            None => json!({}),
        };

        let payload = FlameReport {
            object_name: self.target.display_name(),
            sample_interval: self.source.interval(),
            run_time: round_decimals(samples.run_time, 6),
            call_stats,
            total_samples,
            timestamp: Utc::now().timestamp(),
        };
        Ok(serde_json::to_value(payload)?)
    }
}
