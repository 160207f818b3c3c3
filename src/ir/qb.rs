//! Query Block model (spec.md §3 "Query Block (QB)", component 2).
//!
//! Populated by the phase-1 analyzer (spec.md §4.1) from a single AST walk,
//! then consumed by the metadata binder, expression compiler and operator
//! tree planner. Shaped as a plain data struct with owned collections, the
//! way the teacher's `ir::pl` nodes carry their children directly rather
//! than through indirection — QBs are cheap, short-lived, and never shared
//! across queries (spec.md §5).

use std::collections::{BTreeMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::ast::AstNode;
use crate::metastore::{Partition, Table};

pub const IMPLICIT_DESTINATION: &str = "reduce";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub bucket_num: u32,
    pub total_buckets: u32,
    /// Explicit `ON cols`; empty means "use the table's own bucketing cols".
    pub on_columns: Vec<AstNode>,
}

/// One destination's clauses, spec.md §3 `parseInfo`.
#[derive(Debug, Clone, Default)]
pub struct DestClause {
    pub select_exprs: Option<AstNode>,
    pub is_select_distinct: bool,
    pub where_expr: Option<AstNode>,
    pub group_by_exprs: Vec<AstNode>,
    pub cluster_by_exprs: Vec<AstNode>,
    pub distribute_by_exprs: Vec<AstNode>,
    pub sort_by: Vec<(AstNode, SortDirection)>,
    pub limit: Option<u64>,
    /// Aggregation subtrees keyed by canonical text (spec.md §4.1).
    pub aggregations: IndexMap<String, AstNode>,
    pub distinct_aggregation: Option<AstNode>,
    pub destination: Destination,
    pub transform: Option<AstNode>,
}

#[derive(Debug, Clone)]
pub enum Destination {
    /// `insclause-N` writing to a temp file, implicit select, or explicit
    /// `INSERT OVERWRITE DIRECTORY`.
    File { path: String },
    Table { name: String, partition: Vec<(String, Option<String>)> },
    /// Not yet assigned (during phase-1 construction).
    Unresolved,
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Unresolved
    }
}

/// One side of a join tree node: either a base table/subquery alias, or a
/// nested join (spec.md §3 "Join tree node").
#[derive(Debug, Clone)]
pub enum JoinSrc {
    Base(String),
    Nested(Box<JoinTreeNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinType {
    pub fn is_outer(self) -> bool {
        !matches!(self, JoinType::Inner)
    }
}

/// Binary at construction time, multi-way after merging (spec.md §4.6).
/// `side` indexes 0..N across `right_aliases`/`base_src`/`expressions`/
/// `filters`, with position 0 always belonging to the left side.
#[derive(Debug, Clone)]
pub struct JoinTreeNode {
    pub join_type: JoinType,
    pub left_alias: Option<String>,
    pub left_aliases: Vec<String>,
    pub right_aliases: Vec<String>,
    /// `base_src[i]` is `Some` iff position `i` is a table/subquery rather
    /// than another join (spec.md §3 invariant).
    pub base_src: Vec<Option<String>>,
    pub join_src: Option<Box<JoinTreeNode>>,
    /// `expressions[i]` is the i-th side's list of equi-join key exprs;
    /// every side has the same length (spec.md §3 invariant).
    pub expressions: Vec<Vec<AstNode>>,
    pub filters: Vec<Vec<AstNode>>,
    pub no_outer_join: bool,
    pub next_tag: u32,
}

impl JoinTreeNode {
    pub fn new(join_type: JoinType) -> Self {
        JoinTreeNode {
            join_type,
            left_alias: None,
            left_aliases: Vec::new(),
            right_aliases: Vec::new(),
            base_src: vec![None, None],
            join_src: None,
            expressions: vec![Vec::new(), Vec::new()],
            filters: vec![Vec::new(), Vec::new()],
            no_outer_join: !join_type.is_outer(),
            next_tag: 0,
        }
    }

    pub fn num_sides(&self) -> usize {
        self.base_src.len()
    }

    /// All aliases reachable from this node, left-to-right.
    pub fn all_aliases(&self) -> Vec<String> {
        let mut out = self.left_aliases.clone();
        out.extend(self.right_aliases.iter().cloned());
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct QbMetaData {
    pub tables: BTreeMap<String, Table>,
    pub confirmed_partitions: BTreeMap<String, Vec<Partition>>,
}

/// A `QB-expression`: `NULLOP(QB)` for a plain query, `UNION(lhs, rhs)` for
/// `UNION ALL` inside a subquery (spec.md §3). Top-level union is rejected
/// by the phase-1 analyzer before a `QbExpr` is ever constructed for it.
#[derive(Debug, Clone)]
pub enum QbExpr {
    Single(Box<Qb>),
    UnionAll(Box<QbExpr>, Box<QbExpr>),
}

impl QbExpr {
    pub fn is_query(&self) -> bool {
        matches!(self, QbExpr::Single(qb) if qb.is_query)
    }
}

#[derive(Debug, Clone)]
pub struct Qb {
    pub id: String,
    pub alias: Option<String>,
    pub is_sub_query: bool,
    pub is_query: bool,

    pub parse_info: IndexMap<String, DestClause>,

    pub tab_aliases: IndexSet<String>,
    pub tab_name_for_alias: IndexMap<String, String>,

    pub subq_aliases: IndexSet<String>,
    pub subq_for_alias: IndexMap<String, QbExpr>,

    /// Table-sample specs, keyed by table alias (spec.md §4.1 "attach
    /// table sample ... if present" — tracked per alias like Hive's
    /// `QBParseInfo.aliasToSample` rather than per destination, since a
    /// sample clause belongs to the `FROM`-side table reference).
    pub alias_to_sample: IndexMap<String, SampleSpec>,

    pub join_tree: Option<JoinTreeNode>,

    pub meta_data: QbMetaData,

    dest_name_gen: crate::utils::NameGenerator,
}

impl Qb {
    pub fn new(id: impl Into<String>, alias: Option<String>, is_sub_query: bool) -> Self {
        Qb {
            id: id.into(),
            alias,
            is_sub_query,
            is_query: !is_sub_query,
            parse_info: IndexMap::new(),
            tab_aliases: IndexSet::new(),
            tab_name_for_alias: IndexMap::new(),
            subq_aliases: IndexSet::new(),
            subq_for_alias: IndexMap::new(),
            alias_to_sample: IndexMap::new(),
            join_tree: None,
            meta_data: QbMetaData::default(),
            dest_name_gen: crate::utils::NameGenerator::new("insclause-"),
        }
    }

    /// Allocates the next `insclause-N` destination name (spec.md §4.1
    /// "DESTINATION").
    pub fn next_dest_name(&mut self) -> String {
        self.dest_name_gen.gen()
    }

    pub fn dest(&self, name: &str) -> Option<&DestClause> {
        self.parse_info.get(name)
    }

    pub fn dest_mut(&mut self, name: &str) -> &mut DestClause {
        self.parse_info.entry(name.to_string()).or_default()
    }

    pub fn destination_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parse_info.keys().cloned().collect();
        names.sort();
        names
    }

    /// Spec.md §3 invariant: every alias appears at most once across
    /// `tabAliases ∪ subqAliases`.
    pub fn check_alias_uniqueness(&self) -> Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::new();
        for a in self.tab_aliases.iter().chain(self.subq_aliases.iter()) {
            if !seen.insert(a.as_str()) {
                return Err(a.clone());
            }
        }
        Ok(())
    }

    pub fn is_alias_known(&self, alias: &str) -> bool {
        self.tab_aliases.contains(alias) || self.subq_aliases.contains(alias)
    }
}
