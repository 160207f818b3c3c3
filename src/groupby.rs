//! Group-by planner (spec.md §4.5).
//!
//! Picks among the four physical strategies the spec names and wires the
//! corresponding `GroupBy`/`ReduceSink` operator chain. Grounded on the
//! teacher's `sql::gen_query`/`sql::pq` stage-splitting: each strategy here
//! is a small function building one fixed operator shape, the same way the
//! teacher keeps `compile_select`/`compile_aggregation` as separate
//! functions rather than one branch-heavy mega-function.

use indexmap::IndexMap;
use log::warn;

use crate::ir::expr::Expr;
use crate::ir::operator::{Aggregator, GroupByKey, OpGraph, OpId, OpKind, ReduceSinkKey};
use crate::ir::qb::SortDirection;
use crate::metastore::AggregateMode;

#[derive(Debug, Clone)]
pub struct AggregatorSpec {
    pub udf_class: String,
    pub args: Vec<Expr>,
    pub is_distinct: bool,
    pub alias: String,
}

fn aggregators_for_mode(specs: &[AggregatorSpec], mode: AggregateMode) -> Vec<Aggregator> {
    specs
        .iter()
        .map(|s| Aggregator {
            udf_class: s.udf_class.clone(),
            method: AggregateMode::evaluate_method(mode, s.is_distinct).to_string(),
            args: s.args.clone(),
            is_distinct: s.is_distinct,
            alias: s.alias.clone(),
        })
        .collect()
}

fn finalizing_aggregators(specs: &[AggregatorSpec], mode: AggregateMode) -> Vec<Aggregator> {
    specs
        .iter()
        .map(|s| Aggregator {
            udf_class: s.udf_class.clone(),
            method: mode.terminate_method().to_string(),
            args: s.args.clone(),
            is_distinct: s.is_distinct,
            alias: s.alias.clone(),
        })
        .collect()
}

fn sink_keys(exprs: &[Expr]) -> Vec<ReduceSinkKey> {
    exprs
        .iter()
        .map(|e| ReduceSinkKey {
            expr: e.clone(),
            order: SortDirection::Asc,
        })
        .collect()
}

/// `genGroupByPlan1MR`: a single shuffle keyed on group keys plus distinct
/// arguments, with a `COMPLETE`-mode aggregator on the reduce side.
/// Reserved (per DESIGN.md's resolution of spec.md's open strategy-mapping
/// gap) for the case with both group keys and a distinct aggregate but
/// map-side aggregation disabled.
pub fn plan_1mr(graph: &mut OpGraph, input: OpId, keys: &[GroupByKey], aggs: &[AggregatorSpec]) -> OpId {
    let mut sink_exprs: Vec<Expr> = keys.iter().map(|k| k.expr.clone()).collect();
    for a in aggs.iter().filter(|a| a.is_distinct) {
        sink_exprs.extend(a.args.iter().cloned());
    }
    let agg_args: Vec<Expr> = aggs.iter().flat_map(|a| a.args.iter().cloned()).collect();

    let rs = graph.add(OpKind::ReduceSink {
        keys: sink_keys(&sink_exprs),
        values: agg_args,
        partition_keys: keys.iter().map(|k| k.expr.clone()).collect(),
        tag: 0,
        num_reducers: -1,
    });
    graph.link(input, rs);

    let gby = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Complete,
        keys: keys.to_vec(),
        aggregators: aggregators_for_mode(aggs, AggregateMode::Complete),
    });
    graph.link(rs, gby);
    gby
}

/// `genGroupByPlan2MR`: `ReduceSink -> GroupBy(PARTIAL1) -> ReduceSink ->
/// GroupBy(FINAL)`. Partitions on the distinct key when one is present
/// (so every occurrence of a value lands on the same reducer), else
/// randomly, spreading skew for the common non-distinct case.
pub fn plan_2mr(graph: &mut OpGraph, input: OpId, keys: &[GroupByKey], aggs: &[AggregatorSpec]) -> OpId {
    let distinct_args: Vec<Expr> = aggs
        .iter()
        .filter(|a| a.is_distinct)
        .flat_map(|a| a.args.iter().cloned())
        .collect();
    let has_distinct = !distinct_args.is_empty();

    let mut stage1_sink_exprs: Vec<Expr> = keys.iter().map(|k| k.expr.clone()).collect();
    stage1_sink_exprs.extend(distinct_args.iter().cloned());
    let stage1_values: Vec<Expr> = aggs.iter().flat_map(|a| a.args.iter().cloned()).collect();

    let rs1_partition = if has_distinct {
        stage1_sink_exprs.clone()
    } else {
        Vec::new() // empty partition keys signal "random" to the executor.
    };

    let rs1 = graph.add(OpKind::ReduceSink {
        keys: sink_keys(&stage1_sink_exprs),
        values: stage1_values,
        partition_keys: rs1_partition,
        tag: 0,
        num_reducers: -1,
    });
    graph.link(input, rs1);

    let gby1 = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Partial1,
        keys: keys.to_vec(),
        aggregators: aggregators_for_mode(aggs, AggregateMode::Partial1),
    });
    graph.link(rs1, gby1);

    let stage2_keys: Vec<Expr> = keys.iter().map(|k| k.expr.clone()).collect();
    let rs2 = graph.add(OpKind::ReduceSink {
        keys: sink_keys(&stage2_keys),
        values: aggs.iter().flat_map(|a| a.args.iter().cloned()).collect(),
        partition_keys: stage2_keys,
        tag: 0,
        num_reducers: -1,
    });
    graph.link(gby1, rs2);

    let gby2 = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Final,
        keys: keys.to_vec(),
        aggregators: finalizing_aggregators(aggs, AggregateMode::Final),
    });
    graph.link(rs2, gby2);
    gby2
}

/// `genGroupByPlan4MR`: adds a map-side `HASH`-mode pre-aggregation before
/// the usual two-shuffle plan, cutting shuffle volume when the key
/// cardinality is much smaller than the row count.
pub fn plan_4mr(graph: &mut OpGraph, input: OpId, keys: &[GroupByKey], aggs: &[AggregatorSpec]) -> OpId {
    let map_gby = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Hash,
        keys: keys.to_vec(),
        aggregators: aggregators_for_mode(aggs, AggregateMode::Hash),
    });
    graph.link(input, map_gby);

    let group_keys: Vec<Expr> = keys.iter().map(|k| k.expr.clone()).collect();
    let rs1 = graph.add(OpKind::ReduceSink {
        keys: sink_keys(&group_keys),
        values: aggs.iter().flat_map(|a| a.args.iter().cloned()).collect(),
        partition_keys: group_keys.clone(),
        tag: 0,
        num_reducers: -1,
    });
    graph.link(map_gby, rs1);

    let gby_partial2 = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Partial2,
        keys: keys.to_vec(),
        aggregators: aggregators_for_mode(aggs, AggregateMode::Partial2),
    });
    graph.link(rs1, gby_partial2);

    let rs2 = graph.add(OpKind::ReduceSink {
        keys: sink_keys(&group_keys),
        values: aggs.iter().flat_map(|a| a.args.iter().cloned()).collect(),
        partition_keys: group_keys,
        tag: 0,
        num_reducers: -1,
    });
    graph.link(gby_partial2, rs2);

    let gby_final = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Final,
        keys: keys.to_vec(),
        aggregators: finalizing_aggregators(aggs, AggregateMode::Final),
    });
    graph.link(rs2, gby_final);
    gby_final
}

/// Fast path for `COUNT(*)`-shaped queries with neither group keys nor a
/// distinct aggregate: `HASH -> ReduceSink(1 reducer) -> GroupBy(FINAL)`.
pub fn plan_fast_path(graph: &mut OpGraph, input: OpId, aggs: &[AggregatorSpec]) -> OpId {
    let map_gby = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Hash,
        keys: Vec::new(),
        aggregators: aggregators_for_mode(aggs, AggregateMode::Hash),
    });
    graph.link(input, map_gby);

    let rs = graph.add(OpKind::ReduceSink {
        keys: Vec::new(),
        values: aggs.iter().flat_map(|a| a.args.iter().cloned()).collect(),
        partition_keys: Vec::new(),
        tag: 0,
        num_reducers: 1,
    });
    graph.link(map_gby, rs);

    let gby_final = graph.add(OpKind::GroupBy {
        mode: AggregateMode::Final,
        keys: Vec::new(),
        aggregators: finalizing_aggregators(aggs, AggregateMode::Final),
    });
    graph.link(rs, gby_final);
    gby_final
}

/// Dispatches to one of the four strategies per `(hasGroupKeys,
/// hasDistinct, mapAggrEnabled)`, per DESIGN.md's resolution of spec.md
/// §4.5's unlisted strategy-selection table.
pub fn plan(
    graph: &mut OpGraph,
    input: OpId,
    keys: &[GroupByKey],
    aggs: &[AggregatorSpec],
    map_side_aggregate: bool,
) -> OpId {
    let has_keys = !keys.is_empty();
    let has_distinct = aggs.iter().any(|a| a.is_distinct);

    if !has_keys && !has_distinct {
        plan_fast_path(graph, input, aggs)
    } else if map_side_aggregate {
        plan_4mr(graph, input, keys, aggs)
    } else if has_keys && has_distinct {
        plan_1mr(graph, input, keys, aggs)
    } else {
        plan_2mr(graph, input, keys, aggs)
    }
}

/// Rows between re-estimates of the map-side hash aggregator's per-entry
/// memory footprint, spec.md §4.5.
pub const NUM_ROWS_ESTIMATE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOutcome {
    pub evicted_count: usize,
}

/// Simulates the map-side `HASH` aggregator's memory-bounded flush policy
/// (spec.md §4.5, §8 "HASH flush law"). The real aggregator's row
/// processing is execution-runtime behavior (out of scope, spec.md §1);
/// this models just the capacity/eviction bookkeeping so the law is
/// independently testable and so the planner can warn when it engages.
#[derive(Debug, Clone)]
pub struct HashAggregator {
    max_heap_bytes: u64,
    memory_fraction: f64,
    entries: IndexMap<String, ()>,
    capacity: usize,
    rows_seen: usize,
}

impl HashAggregator {
    pub fn new(max_heap_bytes: u64, memory_fraction: f64) -> Self {
        HashAggregator {
            max_heap_bytes,
            memory_fraction,
            entries: IndexMap::new(),
            capacity: usize::MAX,
            rows_seen: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts/touches `key`, re-estimating capacity every
    /// `NUM_ROWS_ESTIMATE_SIZE` rows from `entry_size_bytes`, and flushing
    /// 10% of entries if the table is now at or over capacity.
    pub fn insert(&mut self, key: impl Into<String>, entry_size_bytes: usize) -> FlushOutcome {
        self.entries.entry(key.into()).or_insert(());
        self.rows_seen += 1;
        if self.rows_seen % NUM_ROWS_ESTIMATE_SIZE == 0 {
            let size = entry_size_bytes.max(1) as f64;
            self.capacity = ((self.max_heap_bytes as f64 * self.memory_fraction) / size).floor() as usize;
        }
        if self.capacity > 0 && self.entries.len() >= self.capacity {
            let outcome = self.flush_fraction(0.1);
            if outcome.evicted_count > 0 {
                warn!(
                    "hash aggregator flushed {} entries at capacity {}",
                    outcome.evicted_count, self.capacity
                );
            }
            outcome
        } else {
            FlushOutcome::default()
        }
    }

    fn flush_fraction(&mut self, frac: f64) -> FlushOutcome {
        let n = ((self.entries.len() as f64) * frac).ceil() as usize;
        let victims: Vec<String> = self.entries.keys().take(n).cloned().collect();
        for k in &victims {
            self.entries.shift_remove(k);
        }
        FlushOutcome {
            evicted_count: victims.len(),
        }
    }

    /// Flushes every remaining entry, spec.md §4.5 `close()` behavior.
    pub fn close(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
