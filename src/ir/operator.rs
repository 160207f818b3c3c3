//! Operator tree / DAG (spec.md §3 "Operator tree", §4.9).
//!
//! Grounded on the teacher's `ir::rq::Transform` enum: a closed set of
//! relational operator variants, each carrying only the fields it needs,
//! arranged into a DAG by parent/child id lists rather than owned pointers
//! so the MR task planner (spec.md §4.10) can walk and cut it without
//! fighting the borrow checker.

use indexmap::IndexMap;

use crate::ir::expr::Expr;
use crate::ir::qb::SortDirection;
use crate::metastore::{AggregateMode, FileFormat, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub usize);

impl From<usize> for OpId {
    fn from(v: usize) -> Self {
        OpId(v)
    }
}

#[derive(Debug, Clone)]
pub struct GroupByKey {
    pub expr: Expr,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    pub udf_class: String,
    pub method: String,
    pub args: Vec<Expr>,
    pub is_distinct: bool,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct ReduceSinkKey {
    pub expr: Expr,
    pub order: SortDirection,
}

/// Spec.md §4.9/§4.10 operator descriptor. Each variant carries exactly the
/// fields spec.md's operator catalogue lists for it; nothing speculative.
#[derive(Debug, Clone)]
pub enum OpKind {
    TableScan {
        alias: String,
        table: Table,
        /// Columns actually referenced downstream; drives column pruning.
        needed_columns: Vec<String>,
    },
    Filter {
        predicate: Expr,
        /// True for a partition-predicate-only filter consumed entirely by
        /// the pruner and kept only for re-execution safety (spec.md §4.7).
        is_sampling_pred: bool,
    },
    Select {
        exprs: Vec<Expr>,
        out_names: Vec<String>,
    },
    GroupBy {
        mode: AggregateMode,
        keys: Vec<GroupByKey>,
        aggregators: Vec<Aggregator>,
    },
    ReduceSink {
        keys: Vec<ReduceSinkKey>,
        values: Vec<Expr>,
        partition_keys: Vec<Expr>,
        tag: i32,
        num_reducers: i32,
    },
    Join {
        /// One key list per input tag, tag order matches parent order.
        key_exprs: Vec<Vec<Expr>>,
        filters: Vec<Vec<Expr>>,
        outer_sides: Vec<bool>,
    },
    FileSink {
        path: String,
        format: FileFormat,
        compress: bool,
    },
    Limit {
        n: u64,
    },
    Forward,
    Script {
        command: String,
    },
    Extract {
        tag: i32,
    },
}

#[derive(Debug, Clone)]
pub struct Operator {
    pub id: OpId,
    pub kind: OpKind,
    pub parents: Vec<OpId>,
    pub children: Vec<OpId>,
    /// Output schema: internal column name -> position, insertion ordered.
    pub out_schema: IndexMap<String, usize>,
}

/// The full operator DAG for one compiled query (spec.md §3). Owns every
/// node; edges are plain id references, mirroring how the teacher's `rq`
/// pipeline threads `TableRef`s by id rather than by direct ownership.
#[derive(Debug, Clone, Default)]
pub struct OpGraph {
    nodes: IndexMap<OpId, Operator>,
    next_id: usize,
}

impl OpGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: OpKind) -> OpId {
        let id = OpId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Operator {
                id,
                kind,
                parents: Vec::new(),
                children: Vec::new(),
                out_schema: IndexMap::new(),
            },
        );
        id
    }

    /// Links `child` under `parent`, updating both adjacency lists. Spec.md
    /// §3 invariant: every non-root operator has exactly the parents its
    /// kind allows (one, except `Join`/`Union` which allow many).
    pub fn link(&mut self, parent: OpId, child: OpId) {
        self.nodes.get_mut(&parent).expect("parent exists").children.push(child);
        self.nodes.get_mut(&child).expect("child exists").parents.push(parent);
    }

    pub fn get(&self, id: OpId) -> &Operator {
        &self.nodes[&id]
    }

    pub fn get_mut(&mut self, id: OpId) -> &mut Operator {
        self.nodes.get_mut(&id).expect("operator exists")
    }

    pub fn roots(&self) -> Vec<OpId> {
        self.nodes
            .values()
            .filter(|op| op.parents.is_empty())
            .map(|op| op.id)
            .collect()
    }

    pub fn leaves(&self) -> Vec<OpId> {
        self.nodes
            .values()
            .filter(|op| op.children.is_empty())
            .map(|op| op.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operator> {
        self.nodes.values()
    }

    /// Clears `op`'s child list and returns the detached children, spec.md
    /// §3 Lifecycle: "the reduce-sink's child list is cleared; the child
    /// subtrees are attached to the next task's plan." Children keep their
    /// own `parents` entry pointing back at `op` — nothing downstream reads
    /// a reduce-sink's own adjacency by walking backward from its former
    /// children, and the map/reduce task planner already tracks job
    /// dependencies by id rather than by re-deriving them from the graph.
    pub fn cut_children(&mut self, op: OpId) -> Vec<OpId> {
        std::mem::take(&mut self.nodes.get_mut(&op).expect("operator exists").children)
    }

    /// Depth-first walk from `start`, visiting each node once, children
    /// before being revisited through another parent (used by the MR task
    /// planner's cutting pass, spec.md §4.10).
    pub fn walk_from(&self, start: OpId) -> Vec<OpId> {
        let mut order = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            for &child in self.get(id).children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_updates_both_adjacency_lists() {
        let mut g = OpGraph::new();
        let a = g.add(OpKind::Forward);
        let b = g.add(OpKind::Forward);
        g.link(a, b);
        assert_eq!(g.get(a).children, vec![b]);
        assert_eq!(g.get(b).parents, vec![a]);
    }

    #[test]
    fn roots_and_leaves_are_correct() {
        let mut g = OpGraph::new();
        let a = g.add(OpKind::Forward);
        let b = g.add(OpKind::Forward);
        let c = g.add(OpKind::Forward);
        g.link(a, b);
        g.link(b, c);
        assert_eq!(g.roots(), vec![a]);
        assert_eq!(g.leaves(), vec![c]);
    }

    #[test]
    fn cut_children_empties_the_parent_and_returns_the_former_children() {
        let mut g = OpGraph::new();
        let a = g.add(OpKind::Forward);
        let b = g.add(OpKind::Forward);
        let c = g.add(OpKind::Forward);
        g.link(a, b);
        g.link(a, c);
        let cut = g.cut_children(a);
        assert_eq!(cut, vec![b, c]);
        assert!(g.get(a).children.is_empty());
    }

    #[test]
    fn walk_visits_each_node_once_through_diamond() {
        let mut g = OpGraph::new();
        let a = g.add(OpKind::Forward);
        let b = g.add(OpKind::Forward);
        let c = g.add(OpKind::Forward);
        let d = g.add(OpKind::Join {
            key_exprs: vec![],
            filters: vec![],
            outer_sides: vec![],
        });
        g.link(a, b);
        g.link(a, c);
        g.link(b, d);
        g.link(c, d);
        let order = g.walk_from(a);
        assert_eq!(order.len(), 4);
    }
}
