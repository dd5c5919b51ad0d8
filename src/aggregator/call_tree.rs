//! Call tree reconstruction from deterministic call records.
//!
//! A call source reports flat per-function records with caller edges.
//! Reconstruction has three steps:
//! 1. Invert the caller edges into a callee adjacency, ordered by
//!    frame key so the tree shape is deterministic
//! 2. Pick the root: the record with the largest cumulative time
//!    (ties go to the smallest frame key)
//! 3. Recurse through the adjacency, tracking the frames on the
//!    current path so recursive call cycles terminate
//!
//! The path set is freshly constructed per build and entries are
//! removed on the way back up, so a frame excluded under one branch
//! can still appear under a sibling.

use crate::aggregator::assembler::Aggregator;
use crate::aggregator::round_decimals;
use crate::probe::{CallGraph, CallRecord, CallSource, FrameKey, ProfileTarget, TargetRunner};
use crate::report::{CallTreeNode, CallTreeReport};
use crate::utils::error::TargetError;
use chrono::Utc;
use log::debug;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// **Public** - Builds the call tree for a profiled call graph.
///
/// # Arguments
/// * `graph` - Flat call records with caller edges, plus run totals
///
/// # Returns
/// The reconstructed tree, rooted at the record with the largest
/// cumulative time. An empty graph yields the `<empty>` sentinel node.
pub fn build_call_tree(graph: &CallGraph) -> CallTreeNode {
    let root = match graph
        .records
        .iter()
        .max_by(|a, b| {
            a.cumulative_time
                .total_cmp(&b.cumulative_time)
                .then_with(|| b.frame.cmp(&a.frame))
        }) {
        Some(record) => record,
        None => return CallTreeNode::empty(),
    };

    let callees = build_callees(&graph.records);
    debug!(
        "Building call tree from {} record(s), root '{}'",
        graph.records.len(),
        root.frame.function
    );

    let mut on_path = HashSet::new();
    build_node(root, &callees, graph.total_time, &mut on_path)
}

/// **Private** - Inverts caller edges into a callee adjacency.
///
/// Records are visited in frame-key order, so every callee list comes
/// out sorted by callee frame and the resulting tree shape does not
/// depend on record order. Duplicate caller entries collapse to one
/// edge.
fn build_callees(records: &[CallRecord]) -> HashMap<&FrameKey, Vec<&CallRecord>> {
    let mut ordered: Vec<&CallRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.frame.cmp(&b.frame));

    let mut callees: HashMap<&FrameKey, Vec<&CallRecord>> = HashMap::new();
    for record in ordered {
        let mut callers: Vec<&FrameKey> = record.callers.iter().collect();
        callers.sort();
        callers.dedup();
        for caller in callers {
            callees.entry(caller).or_default().push(record);
        }
    }
    callees
}

/// **Private** - Builds one node and its subtree.
///
/// `on_path` holds the frames between the root and this node. A
/// callee already on the path is skipped, which is what terminates
/// direct and mutual recursion. The frame is removed again before
/// returning so sibling branches are unaffected.
fn build_node(
    record: &CallRecord,
    callees: &HashMap<&FrameKey, Vec<&CallRecord>>,
    total_time: f64,
    on_path: &mut HashSet<FrameKey>,
) -> CallTreeNode {
    on_path.insert(record.frame.clone());

    let mut children = Vec::new();
    if let Some(callee_records) = callees.get(&record.frame) {
        for callee in callee_records {
            if !on_path.contains(&callee.frame) {
                children.push(build_node(callee, callees, total_time, on_path));
            }
        }
    }

    on_path.remove(&record.frame);

    let percentage = if total_time > 0.0 {
        round_decimals(100.0 * record.cumulative_time / total_time, 2)
    } else {
        0.0
    };

    CallTreeNode {
        module_name: record.frame.file.clone(),
        lineno: record.frame.line,
        func_name: record.frame.function.clone(),
        prim_calls: record.primitive_calls,
        total_calls: record.total_calls,
        time_per_call: round_decimals(record.time_per_call, 6),
        cum_time: round_decimals(record.cumulative_time, 6),
        percentage,
        children,
    }
}

/// Aggregator for mode `p`: runs the target under a deterministic
/// call profiler and reports the reconstructed call tree.
pub struct CallTreeAggregator<C, R> {
    source: C,
    runner: R,
    target: ProfileTarget,
}

impl<C: CallSource, R: TargetRunner> CallTreeAggregator<C, R> {
    pub fn new(source: C, runner: R, target: ProfileTarget) -> Self {
        Self {
            source,
            runner,
            target,
        }
    }
}

impl<C: CallSource, R: TargetRunner> Aggregator for CallTreeAggregator<C, R> {
    fn name(&self) -> &'static str {
        "CallTreeAggregator"
    }

    fn run(&mut self) -> Result<Value, TargetError> {
        self.source.start()?;
        let run_result = self.runner.run(&self.target);
        let graph = self.source.stop()?;
        // The source is collected and its hook restored before a
        // failed run surfaces.
        run_result?;

        let payload = CallTreeReport {
            object_name: self.target.display_name(),
            run_time: round_decimals(graph.total_time, 6),
            primitive_calls: graph.primitive_calls,
            total_calls: graph.total_calls,
            call_stats: build_call_tree(&graph),
            timestamp: Utc::now().timestamp(),
        };
        Ok(serde_json::to_value(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(
        frame: FrameKey,
        cumulative_time: f64,
        callers: Vec<FrameKey>,
    ) -> CallRecord {
        CallRecord {
            frame,
            primitive_calls: 1,
            total_calls: 1,
            time_per_call: 0.1,
            cumulative_time,
            callers,
        }
    }

    fn main_frame() -> FrameKey {
        FrameKey::new("app.py", 1, "main")
    }

    fn worker_frame() -> FrameKey {
        FrameKey::new("app.py", 10, "worker")
    }

    fn helper_frame() -> FrameKey {
        FrameKey::new("util.py", 5, "helper")
    }

    #[test]
    fn test_build_call_tree_simple_chain() {
        let graph = CallGraph {
            records: vec![
                record(main_frame(), 2.0, vec![]),
                record(worker_frame(), 1.5, vec![main_frame()]),
                record(helper_frame(), 0.5, vec![worker_frame()]),
            ],
            total_time: 2.0,
            primitive_calls: 3,
            total_calls: 3,
        };

        let tree = build_call_tree(&graph);

        assert_eq!(tree.func_name, "main");
        assert_eq!(tree.percentage, 100.0);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].func_name, "worker");
        assert_eq!(tree.children[0].percentage, 75.0);
        assert_eq!(tree.children[0].children[0].func_name, "helper");
        assert_eq!(tree.children[0].children[0].percentage, 25.0);
    }

    #[test]
    fn test_build_call_tree_terminates_on_self_recursion() {
        let graph = CallGraph {
            records: vec![
                record(main_frame(), 1.0, vec![]),
                record(worker_frame(), 0.8, vec![main_frame(), worker_frame()]),
            ],
            total_time: 1.0,
            primitive_calls: 2,
            total_calls: 12,
        };

        let tree = build_call_tree(&graph);

        assert_eq!(tree.func_name, "main");
        assert_eq!(tree.children.len(), 1);
        let worker = &tree.children[0];
        assert_eq!(worker.func_name, "worker");
        // The recursive edge back into worker is cut.
        assert!(worker.children.is_empty());
    }

    #[test]
    fn test_build_call_tree_terminates_on_mutual_recursion() {
        let graph = CallGraph {
            records: vec![
                record(main_frame(), 3.0, vec![]),
                record(worker_frame(), 2.0, vec![main_frame(), helper_frame()]),
                record(helper_frame(), 1.9, vec![worker_frame()]),
            ],
            total_time: 3.0,
            primitive_calls: 3,
            total_calls: 7,
        };

        let tree = build_call_tree(&graph);

        let worker = &tree.children[0];
        let helper = &worker.children[0];
        assert_eq!(helper.func_name, "helper");
        // helper calls worker, but worker is already on this path.
        assert!(helper.children.is_empty());
    }

    #[test]
    fn test_build_call_tree_no_frame_repeats_on_any_path() {
        fn check_path(node: &CallTreeNode, path: &mut Vec<(String, u32, String)>) {
            let key = (
                node.module_name.clone(),
                node.lineno,
                node.func_name.clone(),
            );
            assert!(!path.contains(&key), "frame repeated on path: {:?}", key);
            path.push(key);
            for child in &node.children {
                check_path(child, path);
            }
            path.pop();
        }

        let graph = CallGraph {
            records: vec![
                record(main_frame(), 5.0, vec![helper_frame()]),
                record(worker_frame(), 4.0, vec![main_frame(), worker_frame()]),
                record(helper_frame(), 3.0, vec![worker_frame(), main_frame()]),
            ],
            total_time: 5.0,
            primitive_calls: 3,
            total_calls: 30,
        };

        let tree = build_call_tree(&graph);
        check_path(&tree, &mut Vec::new());
    }

    #[test]
    fn test_build_call_tree_sibling_branches_can_share_frames() {
        // helper is called by both main and worker; it is excluded
        // only while it is on the current path, so it appears under
        // both branches.
        let graph = CallGraph {
            records: vec![
                record(main_frame(), 4.0, vec![]),
                record(worker_frame(), 2.0, vec![main_frame()]),
                record(helper_frame(), 1.0, vec![main_frame(), worker_frame()]),
            ],
            total_time: 4.0,
            primitive_calls: 3,
            total_calls: 3,
        };

        let tree = build_call_tree(&graph);

        let child_names: Vec<&str> = tree
            .children
            .iter()
            .map(|child| child.func_name.as_str())
            .collect();
        assert_eq!(child_names, vec!["worker", "helper"]);

        let worker = &tree.children[0];
        assert_eq!(worker.children.len(), 1);
        assert_eq!(worker.children[0].func_name, "helper");
    }

    #[test]
    fn test_build_call_tree_zero_total_time() {
        let graph = CallGraph {
            records: vec![record(main_frame(), 0.0, vec![])],
            total_time: 0.0,
            primitive_calls: 1,
            total_calls: 1,
        };

        let tree = build_call_tree(&graph);
        assert_eq!(tree.percentage, 0.0);
    }

    #[test]
    fn test_build_call_tree_empty_graph_sentinel() {
        let tree = build_call_tree(&CallGraph::default());
        assert_eq!(tree.func_name, "<empty>");
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_build_call_tree_root_tie_breaks_deterministically() {
        let first = FrameKey::new("a.py", 1, "alpha");
        let second = FrameKey::new("b.py", 1, "beta");
        let graph = CallGraph {
            records: vec![
                record(second.clone(), 1.0, vec![]),
                record(first.clone(), 1.0, vec![]),
            ],
            total_time: 1.0,
            primitive_calls: 2,
            total_calls: 2,
        };

        // Equal cumulative times: the smaller frame key wins,
        // regardless of record order.
        let tree = build_call_tree(&graph);
        assert_eq!(tree.module_name, "a.py");
        assert_eq!(tree.func_name, "alpha");
    }

    #[test]
    fn test_build_call_tree_rounds_display_values() {
        let mut rec = record(main_frame(), 1.23456789, vec![]);
        rec.time_per_call = 0.000123456789;
        let graph = CallGraph {
            records: vec![rec],
            total_time: 3.7,
            primitive_calls: 1,
            total_calls: 1,
        };

        let tree = build_call_tree(&graph);
        assert_eq!(tree.cum_time, 1.234568);
        assert_eq!(tree.time_per_call, 0.000123);
        assert_eq!(tree.percentage, 33.37);
    }
}
