//! Map/Reduce task planner (spec.md §4.10).
//!
//! Cuts the operator DAG at `ReduceSink` boundaries into a dependency graph
//! of `MrJobTask`s, or collapses the whole plan into a single `FetchTask`
//! when the fast-path preconditions hold. Grounded on the teacher's
//! `sql::srq` pipeline splitter, which walks a `Transform` chain and starts
//! a new pipeline stage wherever materialization is unavoidable — here a
//! shuffle plays that role instead of a CTE boundary.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::{debug, warn};

use crate::ast::TokenKind;
use crate::config::Config;
use crate::error::Result;
use crate::ir::operator::{OpGraph, OpId, OpKind};
use crate::ir::qb::Qb;
use crate::ir::task::{FetchTask, MrJobTask, Task, TaskGraph, TaskId};
use crate::metastore::Metastore;
use crate::pruner::PruneResult;
use crate::session::AnalyzerSession;

/// Enforces strict-mode pruning, runs partition pruning for every touched
/// alias, and picks between the Fetch fast path and the full map/reduce
/// cutting pass (spec.md §4.10, §4.7).
pub fn plan_tasks(qb: &Qb, graph: &mut OpGraph, catalog: &dyn Metastore, session: &mut AnalyzerSession, config: &Config) -> Result<TaskGraph> {
    for (alias, table) in qb.meta_data.tables.iter() {
        if table.is_partitioned() {
            session
                .alias_to_pruner
                .entry(alias.clone())
                .or_insert_with(|| crate::pruner::PartitionPruner::new(table.clone()));
        }
    }
    for pruner in session.alias_to_pruner.values() {
        pruner.enforce_mode(config.partition_pruning)?;
    }

    let mut pruned: BTreeMap<String, PruneResult> = BTreeMap::new();
    for (alias, pruner) in session.alias_to_pruner.iter() {
        if pruner.table.is_partitioned() {
            let partitions = catalog.list_partitions(&pruner.table)?;
            pruned.insert(alias.clone(), pruner.prune(&partitions));
        }
    }

    match try_fetch_fast_path(qb, graph, session, &pruned) {
        FastPathOutcome::Use(fetch) => {
            debug!("fetch fast path selected for destination");
            let mut tg = TaskGraph::new();
            tg.push(Task::Fetch(fetch));
            Ok(tg)
        }
        FastPathOutcome::BlockedByUnknownPartitions => {
            warn!("fetch fast path blocked by unresolved partitions, falling back to map/reduce plan");
            Ok(build_mr_tasks(graph, session))
        }
        FastPathOutcome::NotEligible => Ok(build_mr_tasks(graph, session)),
    }
}

enum FastPathOutcome {
    Use(FetchTask),
    BlockedByUnknownPartitions,
    NotEligible,
}

fn is_bare_star(select_node: &crate::ast::AstNode) -> bool {
    select_node.children.len() == 1
        && select_node.children[0].kind == TokenKind::ColRef
        && select_node.children[0].text == "*"
        && select_node.children[0].first_child_of_kind(TokenKind::Identifier).is_none()
}

/// Spec.md §4.10 "Fast path": `SELECT *` over a single base table, no
/// shuffle clauses, no transform, and either unpartitioned or a
/// fully-resolved (no unknown) partition list.
fn try_fetch_fast_path(qb: &Qb, graph: &OpGraph, session: &mut AnalyzerSession, pruned: &BTreeMap<String, PruneResult>) -> FastPathOutcome {
    if qb.join_tree.is_some() || !qb.subq_aliases.is_empty() {
        return FastPathOutcome::NotEligible;
    }
    let mut aliases = qb.tab_aliases.iter();
    let Some(alias) = aliases.next() else { return FastPathOutcome::NotEligible };
    if aliases.next().is_some() {
        return FastPathOutcome::NotEligible;
    }

    let dest_names = qb.destination_names();
    if dest_names.len() != 1 {
        return FastPathOutcome::NotEligible;
    }
    let Some(clause) = qb.dest(&dest_names[0]) else { return FastPathOutcome::NotEligible };
    let Some(select) = &clause.select_exprs else { return FastPathOutcome::NotEligible };

    let structurally_eligible = is_bare_star(select)
        && clause.group_by_exprs.is_empty()
        && clause.aggregations.is_empty()
        && clause.cluster_by_exprs.is_empty()
        && clause.distribute_by_exprs.is_empty()
        && clause.sort_by.is_empty()
        && clause.transform.is_none();
    if !structurally_eligible {
        return FastPathOutcome::NotEligible;
    }

    if let Some(table) = qb.meta_data.tables.get(alias) {
        if table.is_partitioned() {
            match pruned.get(alias) {
                Some(result) if result.unknown.is_empty() => {}
                _ => return FastPathOutcome::BlockedByUnknownPartitions,
            }
        }
    }

    let scan = session.top_ops.iter().copied().find(|&op| matches!(&graph.get(op).kind, OpKind::TableScan { alias: a, .. } if a == alias));
    let Some(root) = scan else { return FastPathOutcome::NotEligible };

    FastPathOutcome::Use(FetchTask {
        id: session.next_task_id(),
        root,
        limit: clause.limit,
    })
}

/// Cuts `graph` into `MrJobTask`s. Each job is seeded either at a
/// `TableScan` (R1) or at the child of a `ReduceSink` belonging to an
/// already-completed job (R3); within a job, the first `ReduceSink`
/// encountered sets its `reduce_root` (R2), and any further `ReduceSink`
/// hands its child off as the seed of a new job instead of being walked
/// into (R3). A `FileSink` terminates the branch it's on (R4); it has no
/// children so the walk ends there naturally.
fn build_mr_tasks(graph: &mut OpGraph, session: &mut AnalyzerSession) -> TaskGraph {
    let mut tg = TaskGraph::new();
    let mut op_to_job: HashMap<OpId, TaskId> = HashMap::new();
    let mut job_of_root: HashMap<OpId, TaskId> = HashMap::new();

    let mut queue: VecDeque<OpId> = session.top_ops.iter().copied().collect();
    let mut fetched_filesinks: HashSet<OpId> = HashSet::new();

    while let Some(root) = queue.pop_front() {
        if job_of_root.contains_key(&root) {
            continue;
        }
        let id = session.next_task_id();
        job_of_root.insert(root, id);

        let depends_on = dependency_jobs(graph, root, &op_to_job);

        let mut job = MrJobTask {
            id,
            map_root: root,
            reduce_root: None,
            num_reducers: -1,
            load_table_work: Vec::new(),
            load_file_work: Vec::new(),
            depends_on,
        };

        let mut shuffled = false;
        let mut new_roots = Vec::new();
        let mut contains_filesink = false;
        walk_job(graph, root, &mut job, &mut shuffled, &mut op_to_job, &mut new_roots, &mut contains_filesink);

        if contains_filesink && fetched_filesinks.is_empty() {
            job.load_table_work = session.load_table_work.clone();
            job.load_file_work = session.load_file_work.clone();
            fetched_filesinks.insert(root);
        }

        tg.push(Task::MrJob(job));
        queue.extend(new_roots);
    }

    tg
}

fn dependency_jobs(graph: &OpGraph, root: OpId, op_to_job: &HashMap<OpId, TaskId>) -> Vec<TaskId> {
    let mut deps = Vec::new();
    for &parent in &graph.get(root).parents {
        if matches!(&graph.get(parent).kind, OpKind::ReduceSink { .. }) {
            if let Some(&job) = op_to_job.get(&parent) {
                if !deps.contains(&job) {
                    deps.push(job);
                }
            }
        }
    }
    deps
}

fn walk_job(
    graph: &mut OpGraph,
    op_id: OpId,
    job: &mut MrJobTask,
    shuffled: &mut bool,
    op_to_job: &mut HashMap<OpId, TaskId>,
    new_roots: &mut Vec<OpId>,
    contains_filesink: &mut bool,
) {
    if op_to_job.contains_key(&op_id) {
        return;
    }
    op_to_job.insert(op_id, job.id);

    if let OpKind::FileSink { .. } = &graph.get(op_id).kind {
        *contains_filesink = true;
        return;
    }

    if let OpKind::ReduceSink { .. } = &graph.get(op_id).kind {
        if !*shuffled {
            *shuffled = true;
            if let Some(&child) = graph.get(op_id).children.first() {
                job.reduce_root = Some(child);
                walk_job(graph, child, job, shuffled, op_to_job, new_roots, contains_filesink);
            }
        } else {
            // Job boundary: this reduce-sink's children become the next
            // task's plan, spec.md §3 Lifecycle.
            new_roots.extend(graph.cut_children(op_id));
        }
        return;
    }

    let children = graph.get(op_id).children.clone();
    for child in children {
        walk_job(graph, child, job, shuffled, op_to_job, new_roots, contains_filesink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::Expr;
    use crate::ir::operator::{GroupByKey, ReduceSinkKey};
    use crate::ir::qb::SortDirection;
    use crate::ir::types::{PrimitiveType, TypeInfo};
    use crate::metastore::{AggregateMode, FileFormat};

    fn int_ty() -> TypeInfo {
        TypeInfo::Primitive(PrimitiveType::Integer)
    }

    #[test]
    fn two_stage_groupby_cuts_into_two_jobs() {
        let mut g = OpGraph::new();
        let ts = g.add(OpKind::TableScan {
            alias: "t".to_string(),
            table: crate::metastore::Table {
                name: "t".to_string(),
                schema: vec![],
                partition_cols: vec![],
                bucket_cols: vec![],
                num_buckets: None,
                input_format: FileFormat::Text,
                output_format: FileFormat::Text,
                location: "/t".to_string(),
            },
            needed_columns: vec![],
        });
        let sel = g.add(OpKind::Select { exprs: vec![], out_names: vec![] });
        let rs1 = g.add(OpKind::ReduceSink {
            keys: vec![ReduceSinkKey { expr: Expr::column("0", int_ty()), order: SortDirection::Asc }],
            values: vec![],
            partition_keys: vec![],
            tag: 0,
            num_reducers: -1,
        });
        let gby1 = g.add(OpKind::GroupBy {
            mode: AggregateMode::Partial1,
            keys: vec![GroupByKey { expr: Expr::column("0", int_ty()), alias: "key".to_string() }],
            aggregators: vec![],
        });
        let rs2 = g.add(OpKind::ReduceSink {
            keys: vec![],
            values: vec![],
            partition_keys: vec![],
            tag: 0,
            num_reducers: 1,
        });
        let gby2 = g.add(OpKind::GroupBy {
            mode: AggregateMode::Final,
            keys: vec![],
            aggregators: vec![],
        });
        let fs = g.add(OpKind::FileSink { path: "out".to_string(), format: FileFormat::Text, compress: false });

        g.link(ts, sel);
        g.link(sel, rs1);
        g.link(rs1, gby1);
        g.link(gby1, rs2);
        g.link(rs2, gby2);
        g.link(gby2, fs);

        let mut session = AnalyzerSession::new("sess");
        session.top_ops.push(ts);

        let tg = build_mr_tasks(&mut g, &mut session);
        assert_eq!(tg.tasks.len(), 2);
        let order = tg.topo_order();
        assert_eq!(order.len(), 2);

        let job1 = match &tg.tasks[0] {
            Task::MrJob(j) => j,
            _ => panic!("expected MrJob"),
        };
        assert_eq!(job1.map_root, ts);
        assert_eq!(job1.reduce_root, Some(gby1));

        let job2 = match &tg.tasks[1] {
            Task::MrJob(j) => j,
            _ => panic!("expected MrJob"),
        };
        assert_eq!(job2.map_root, gby2);
        assert_eq!(job2.depends_on, vec![job1.id]);
    }

    #[test]
    fn no_shuffle_chain_is_a_single_job() {
        let mut g = OpGraph::new();
        let ts = g.add(OpKind::TableScan {
            alias: "t".to_string(),
            table: crate::metastore::Table {
                name: "t".to_string(),
                schema: vec![],
                partition_cols: vec![],
                bucket_cols: vec![],
                num_buckets: None,
                input_format: FileFormat::Text,
                output_format: FileFormat::Text,
                location: "/t".to_string(),
            },
            needed_columns: vec![],
        });
        let sel = g.add(OpKind::Select { exprs: vec![], out_names: vec![] });
        let fs = g.add(OpKind::FileSink { path: "out".to_string(), format: FileFormat::Text, compress: false });
        g.link(ts, sel);
        g.link(sel, fs);

        let mut session = AnalyzerSession::new("sess");
        session.top_ops.push(ts);
        let tg = build_mr_tasks(&mut g, &mut session);
        assert_eq!(tg.tasks.len(), 1);
    }
}
