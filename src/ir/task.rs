//! Task descriptors (spec.md §3 "Task graph", §4.10).
//!
//! The MR task planner cuts an `OpGraph` at `ReduceSink` boundaries and
//! emits a dependency DAG of these. Grounded on the teacher's `pq` stage
//! struct, which likewise holds a relation plus the id of the stage it
//! reads from rather than an embedded copy of it.

use crate::ir::operator::OpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

impl From<usize> for TaskId {
    fn from(v: usize) -> Self {
        TaskId(v)
    }
}

/// A table/partition load performed as part of a task's cleanup, spec.md
/// §4.9 step 7 ("move task" semantics folded into the owning MR task per
/// SPEC_FULL.md §15, rather than kept as a separate task kind — see
/// DESIGN.md Open Question 4).
#[derive(Debug, Clone)]
pub struct LoadTableWork {
    pub source_dir: String,
    pub table_name: String,
    pub partition_spec: Vec<(String, Option<String>)>,
    pub is_overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct LoadFileWork {
    pub source_dir: String,
    pub target_dir: String,
    pub is_overwrite: bool,
}

/// One mapper-side or reducer-side half of an MR job, spec.md §4.10: the
/// operator subgraph starting at `root` runs as the map phase if `root` is
/// a `TableScan`, otherwise as a reduce phase fed by one or more upstream
/// jobs' shuffle output.
#[derive(Debug, Clone)]
pub struct MrJobTask {
    pub id: TaskId,
    pub map_root: OpId,
    pub reduce_root: Option<OpId>,
    pub num_reducers: i32,
    pub load_table_work: Vec<LoadTableWork>,
    pub load_file_work: Vec<LoadFileWork>,
    pub depends_on: Vec<TaskId>,
}

/// The trivial-query fast path: no shuffle needed, rows are served directly
/// from the scan/filter/limit chain (spec.md §4.10 "Fetch-task fast path").
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub id: TaskId,
    pub root: OpId,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum Task {
    MrJob(MrJobTask),
    Fetch(FetchTask),
}

impl Task {
    pub fn id(&self) -> TaskId {
        match self {
            Task::MrJob(t) => t.id,
            Task::Fetch(t) => t.id,
        }
    }

    pub fn depends_on(&self) -> &[TaskId] {
        match self {
            Task::MrJob(t) => &t.depends_on,
            Task::Fetch(_) => &[],
        }
    }
}

/// The plan produced by `plan_tasks` (SPEC_FULL.md §10): a dependency DAG
/// of tasks, topologically orderable by `depends_on`.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    pub tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) -> TaskId {
        let id = task.id();
        self.tasks.push(task);
        id
    }

    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on().is_empty())
            .map(|t| t.id())
            .collect()
    }

    /// Kahn's-algorithm topological order; spec.md's task DAG is acyclic by
    /// construction (built bottom-up from completed upstream reduce stages)
    /// so this never needs cycle detection beyond the debug_assert below.
    pub fn topo_order(&self) -> Vec<TaskId> {
        let mut indegree: std::collections::HashMap<TaskId, usize> = self
            .tasks
            .iter()
            .map(|t| (t.id(), t.depends_on().len()))
            .collect();
        let mut ready: std::collections::VecDeque<TaskId> =
            indegree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for t in &self.tasks {
                if t.depends_on().contains(&id) {
                    let e = indegree.get_mut(&t.id()).unwrap();
                    *e -= 1;
                    if *e == 0 {
                        ready.push_back(t.id());
                    }
                }
            }
        }
        debug_assert_eq!(order.len(), self.tasks.len(), "task graph has a cycle");
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(id: usize, root: usize) -> Task {
        Task::Fetch(FetchTask {
            id: TaskId(id),
            root: OpId(root),
            limit: None,
        })
    }

    fn mr(id: usize, root: usize, deps: Vec<usize>) -> Task {
        Task::MrJob(MrJobTask {
            id: TaskId(id),
            map_root: OpId(root),
            reduce_root: None,
            num_reducers: 1,
            load_table_work: vec![],
            load_file_work: vec![],
            depends_on: deps.into_iter().map(TaskId).collect(),
        })
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let mut g = TaskGraph::new();
        g.push(mr(0, 0, vec![]));
        g.push(mr(1, 1, vec![0]));
        g.push(fetch(2, 2));
        let order = g.topo_order();
        let pos = |id: usize| order.iter().position(|t| *t == TaskId(id)).unwrap();
        assert!(pos(0) < pos(1));
    }

    #[test]
    fn roots_have_no_dependencies() {
        let mut g = TaskGraph::new();
        g.push(mr(0, 0, vec![]));
        g.push(mr(1, 1, vec![0]));
        assert_eq!(g.roots(), vec![TaskId(0)]);
    }
}
