//! Mutable per-query analysis state (spec.md §5 "Concurrency & Resource
//! Model": "All state ... is owned by one analyzer instance and must not be
//! shared across queries. `reset()` clears this state between queries.").
//!
//! Named `AnalyzerSession` per SPEC_FULL.md §10. Owns the id generators,
//! the session/scratch-counter pair used by the binder, and the id-keyed
//! bookkeeping the operator-tree planner and MR task planner both read
//! from, the way the teacher threads a single mutable `Context` through its
//! resolver pipeline instead of scattering ad hoc counters.

use std::collections::BTreeMap;

use crate::ir::operator::OpId;
use crate::ir::task::{LoadFileWork, LoadTableWork, TaskId};
use crate::pruner::PartitionPruner;
use crate::utils::IdGenerator;

#[derive(Debug, Clone)]
pub struct AnalyzerSession {
    pub session_id: String,
    scratch_counter: u64,
    op_ids: IdGenerator<OpId>,
    task_ids: IdGenerator<TaskId>,

    /// Root table-scan operators, one per base alias touched by the query.
    pub top_ops: Vec<OpId>,
    /// Root `Select` operators of each destination, used by the task
    /// planner as its walk starting points.
    pub top_sel_ops: Vec<OpId>,

    pub alias_to_pruner: BTreeMap<String, PartitionPruner>,
    pub load_table_work: Vec<LoadTableWork>,
    pub load_file_work: Vec<LoadFileWork>,
}

impl AnalyzerSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        AnalyzerSession {
            session_id: session_id.into(),
            scratch_counter: 0,
            op_ids: IdGenerator::new(),
            task_ids: IdGenerator::new(),
            top_ops: Vec::new(),
            top_sel_ops: Vec::new(),
            alias_to_pruner: BTreeMap::new(),
            load_table_work: Vec::new(),
            load_file_work: Vec::new(),
        }
    }

    pub fn next_op_id(&mut self) -> OpId {
        self.op_ids.gen()
    }

    pub fn next_task_id(&mut self) -> TaskId {
        self.task_ids.gen()
    }

    /// Spec.md §6 destination layout: `<scratchDir>/<sessionId>.<counter>.<destName>`.
    /// The scratch-directory prefix itself is the caller's (host process's)
    /// concern; this returns the session-unique suffix.
    pub fn next_scratch_path(&mut self, dest_name: &str) -> String {
        let counter = self.scratch_counter;
        self.scratch_counter += 1;
        format!("{}.{}.{}", self.session_id, counter, dest_name)
    }

    /// Clears all per-query state, spec.md §5 `reset()`.
    pub fn reset(&mut self) {
        *self = AnalyzerSession::new(std::mem::take(&mut self.session_id));
    }
}
