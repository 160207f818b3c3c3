//! Operator-tree planner (spec.md §4.9 `genPlan`/`genBodyPlan`).
//!
//! Builds table-scan/subquery sources for a QB's `FROM`, runs the join
//! planner over them when a join tree is present, then wires each
//! destination's per-clause operator chain on top of the shared source.
//! Grounded on the teacher's `semantic::resolver::transforms::compile_*`
//! family: one function per pipeline stage, threading a `RowResolver`
//! forward the way the teacher threads a `Context`'s `Scope` through each
//! `compile_*` call rather than mutating a single shared table in place.

use indexmap::IndexMap;

use crate::ast::{AstNode, TokenKind};
use crate::config::Config;
use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::exprcompiler::compile_expr;
use crate::groupby::{self, AggregatorSpec};
use crate::ir::expr::Expr;
use crate::ir::operator::{GroupByKey, OpGraph, OpId, OpKind, ReduceSinkKey};
use crate::ir::qb::{Destination, JoinTreeNode, JoinType, Qb, QbExpr, SortDirection};
use crate::ir::task::{LoadFileWork, LoadTableWork};
use crate::ir::types::TypeInfo;
use crate::join;
use crate::metastore::{FileFormat, FunctionRegistry, Metastore, Table};
use crate::pruner::PartitionPruner;
use crate::rowresolver::{ColumnInfo, RowResolver};
use crate::session::AnalyzerSession;

/// One `FROM`-side input: the operator producing its rows plus the resolver
/// exposing its output columns under whatever alias(es) it carries.
#[derive(Debug, Clone)]
struct Source {
    op: OpId,
    resolver: RowResolver,
}

struct PlanCtx<'a> {
    catalog: &'a dyn Metastore,
    functions: &'a dyn FunctionRegistry,
    config: &'a Config,
}

/// Builds the full operator tree for `qb`: one shared `FROM` source feeding
/// every destination's body plan (spec.md §4.9). Destinations are processed
/// in sorted order for determinism, per spec.md §4.9 preamble.
pub fn gen_plan(
    qb: &Qb,
    catalog: &dyn Metastore,
    functions: &dyn FunctionRegistry,
    session: &mut AnalyzerSession,
    config: &Config,
) -> Result<OpGraph> {
    let mut graph = OpGraph::new();
    let ctx = PlanCtx { catalog, functions, config };
    let source = plan_from(qb, &mut graph, &ctx, session)?;

    for dest_name in qb.destination_names() {
        let clause = qb.dest(&dest_name).expect("destination_names lists existing keys");
        gen_body_plan(qb, &dest_name, clause, &source, &mut graph, &ctx, session)?;
    }
    Ok(graph)
}

fn plan_from(qb: &Qb, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<Source> {
    if let Some(tree) = &qb.join_tree {
        plan_join_tree(tree, qb, graph, ctx, session)
    } else {
        let mut aliases = qb.tab_aliases.iter().chain(qb.subq_aliases.iter());
        let alias = aliases
            .next()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "query has no FROM source"))?;
        if aliases.next().is_some() {
            return Err(SemanticError::new(
                SemanticErrorKind::Generic,
                "multiple FROM sources without a join tree",
            ));
        }
        build_source_for_alias(alias, qb, graph, ctx, session)
    }
}

fn build_source_for_alias(alias: &str, qb: &Qb, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<Source> {
    if let Some(table) = qb.meta_data.tables.get(alias) {
        Ok(build_table_scan(alias, table, graph, session))
    } else if let Some(subq) = qb.subq_for_alias.get(alias) {
        let inner_qb = match subq {
            QbExpr::Single(b) => b.as_ref(),
            QbExpr::UnionAll(..) => {
                return Err(SemanticError::new(
                    SemanticErrorKind::Generic,
                    "UNION ALL subqueries do not yet have an operator-tree realization",
                ))
            }
        };
        let inner = plan_subquery(inner_qb, graph, ctx, session)?;
        let mut resolver = RowResolver::new();
        for (_, col_name, info) in inner.resolver.all_columns_full() {
            resolver.put(alias, col_name, ColumnInfo::new(info.internal_name.clone(), info.ty.clone()).from_alias(alias));
        }
        Ok(Source { op: inner.op, resolver })
    } else {
        Err(SemanticError::new(SemanticErrorKind::InvalidTableAlias, format!("unresolved alias `{alias}`")))
    }
}

/// Plans a subquery down through its own `Select` stage only: a subquery is
/// never materialized with its own `FileSink`, `TRANSFORM`, shuffle, or
/// `LIMIT` handling — those clauses, if present on the subquery's single
/// destination, apply to rows the subquery itself produces and are a
/// documented simplification deferred to DESIGN.md (the common case of a
/// plain projecting subquery is fully supported).
fn plan_subquery(qb: &Qb, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<Source> {
    let source = plan_from(qb, graph, ctx, session)?;
    let names = qb.destination_names();
    let dest_name = names
        .first()
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "subquery has no SELECT"))?;
    let clause = qb.dest(dest_name).expect("destination exists");
    let (op, resolver) = plan_core(qb, dest_name, clause, &source, graph, ctx, session)?;
    Ok(Source { op, resolver })
}

fn build_table_scan(alias: &str, table: &Table, graph: &mut OpGraph, session: &mut AnalyzerSession) -> Source {
    let op = graph.add(OpKind::TableScan {
        alias: alias.to_string(),
        table: table.clone(),
        needed_columns: Vec::new(),
    });
    session.top_ops.push(op);

    let mut resolver = RowResolver::new();
    for (i, col) in table.schema.iter().chain(table.partition_cols.iter()).enumerate() {
        resolver.put(alias, &col.name, ColumnInfo::new(i.to_string(), col.ty.clone()).from_alias(alias));
    }
    Source { op, resolver }
}

/// Recursively realizes a (possibly multi-way, possibly still-nested) join
/// tree, spec.md §4.6. Flat multi-way nodes (post-merge) plan every side as
/// a sibling input into one `Join`; a node still carrying `joinSrc` plans
/// its nested left side first and treats it as a single pre-joined input.
fn plan_join_tree(node: &JoinTreeNode, qb: &Qb, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<Source> {
    let mut sides: Vec<Source> = Vec::with_capacity(node.num_sides());

    if let Some(nested) = &node.join_src {
        sides.push(plan_join_tree(nested, qb, graph, ctx, session)?);
    } else {
        let alias = node.base_src[0]
            .as_ref()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "join tree's first side has neither a base alias nor a nested join"))?;
        sides.push(build_source_for_alias(alias, qb, graph, ctx, session)?);
    }
    for base in node.base_src.iter().skip(1) {
        let alias = base
            .as_ref()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "only the first join side may be a nested join"))?;
        sides.push(build_source_for_alias(alias, qb, graph, ctx, session)?);
    }

    let mut key_exprs = Vec::with_capacity(sides.len());
    let mut filter_exprs = Vec::with_capacity(sides.len());
    let mut value_columns: Vec<Vec<(String, String, ColumnInfo)>> = Vec::with_capacity(sides.len());
    for (i, side) in sides.iter().enumerate() {
        let keys: Vec<Expr> = node.expressions[i]
            .iter()
            .map(|e| compile_expr(e, &side.resolver, ctx.functions))
            .collect::<Result<_>>()?;
        let filters: Vec<Expr> = node.filters[i]
            .iter()
            .map(|e| compile_expr(e, &side.resolver, ctx.functions))
            .collect::<Result<_>>()?;
        key_exprs.push(keys);
        filter_exprs.push(filters);
        value_columns.push(
            side.resolver
                .all_columns_full()
                .into_iter()
                .map(|(alias, col_name, info)| (alias.to_string(), col_name.to_string(), info.clone()))
                .collect(),
        );
    }
    join::unify_key_types(&mut key_exprs, ctx.functions)?;

    register_join_predicates(node, &key_exprs, &filter_exprs, session);

    let value_exprs: Vec<Vec<Expr>> = value_columns
        .iter()
        .map(|cols| cols.iter().map(|(_, _, info)| Expr::column(info.internal_name.clone(), info.ty.clone())).collect())
        .collect();

    let outer_sides = outer_flags(node.join_type, sides.len());
    let inputs: Vec<OpId> = sides.iter().map(|s| s.op).collect();
    let join_op = join::plan_join(graph, &inputs, &key_exprs, &value_exprs, &filter_exprs, &outer_sides);

    // Each side's row became a reduce-sink value channel (spec.md §4.3); tag
    // it so the merged resolver stays unique across sides.
    let mut resolver = RowResolver::new();
    for (tag, cols) in value_columns.iter().enumerate() {
        let side_resolver = reduce_sink_value_resolver(cols);
        for (alias, col_name, info) in side_resolver.all_columns_full() {
            let new_name = format!("{tag}.{}", info.internal_name);
            resolver.put(alias, col_name, ColumnInfo::new(new_name, info.ty.clone()).from_alias(alias));
        }
    }
    Ok(Source { op: join_op, resolver })
}

/// Names a reduce-sink's own output columns `VALUE.j` in emission order
/// (spec.md §4.3): the sort key isn't separately addressable downstream,
/// only the row a `ReduceSink` carries through its value channel is.
fn reduce_sink_value_resolver(columns: &[(String, String, ColumnInfo)]) -> RowResolver {
    let mut resolver = RowResolver::new();
    for (j, (alias, col_name, info)) in columns.iter().enumerate() {
        resolver.put(alias, col_name, ColumnInfo::new(format!("VALUE.{j}"), info.ty.clone()).from_alias(alias.clone()));
    }
    resolver
}

/// `LeftOuter`/`RightOuter` mark only the non-preserved side as nullable;
/// `FullOuter` marks every side; a merged multi-way `Inner` join (the only
/// shape `try_merge` ever produces beyond two sides, spec.md §4.6) marks
/// none. Mixed-outer multi-way merges do not occur in this planner because
/// `no_outer_join` gates merging on both ancestors being non-outer.
fn outer_flags(join_type: JoinType, n: usize) -> Vec<bool> {
    let mut flags = vec![false; n];
    match join_type {
        JoinType::Inner => {}
        JoinType::LeftOuter => {
            if let Some(last) = flags.last_mut() {
                *last = true;
            }
        }
        JoinType::RightOuter => {
            if let Some(first) = flags.first_mut() {
                *first = true;
            }
        }
        JoinType::FullOuter => flags.iter_mut().for_each(|f| *f = true),
    }
    flags
}

fn register_join_predicates(node: &JoinTreeNode, key_exprs: &[Vec<Expr>], filter_exprs: &[Vec<Expr>], session: &mut AnalyzerSession) {
    for (i, alias) in node.base_src.iter().enumerate() {
        let Some(alias) = alias else { continue };
        for expr in key_exprs.get(i).into_iter().flatten().chain(filter_exprs.get(i).into_iter().flatten()) {
            if let Some(pruner) = session.alias_to_pruner.get_mut(alias) {
                pruner.add_join_pred(expr.clone());
            }
        }
    }
}

/// Registers `expr` against every base-table alias it references, creating
/// the alias's `PartitionPruner` on first use (spec.md §4.7).
fn register_where_predicate(qb: &Qb, resolver: &RowResolver, expr: &Expr, session: &mut AnalyzerSession) {
    let mut cols = Vec::new();
    expr.referenced_columns(&mut cols);
    let mut touched_aliases: Vec<String> = Vec::new();
    for col in &cols {
        if let Some(info) = resolver.get_by_internal_name(col) {
            if let Some(alias) = &info.origin_alias {
                if !touched_aliases.contains(alias) {
                    touched_aliases.push(alias.clone());
                }
            }
        }
    }
    for alias in touched_aliases {
        let Some(table) = qb.meta_data.tables.get(&alias) else { continue };
        let pruner = session
            .alias_to_pruner
            .entry(alias)
            .or_insert_with(|| PartitionPruner::new(table.clone()));
        pruner.add_where_pred(expr.clone());
    }
}

fn dense_resolver(columns: Vec<(String, TypeInfo)>) -> RowResolver {
    let mut resolver = RowResolver::new();
    for (i, (name, ty)) in columns.into_iter().enumerate() {
        resolver.put("", &name, ColumnInfo::new(i.to_string(), ty));
    }
    resolver
}

fn out_name(node: &AstNode, index: usize) -> String {
    match node.kind {
        TokenKind::ColRef => node.text.clone(),
        _ => format!("_c{index}"),
    }
}

fn is_star(node: &AstNode) -> bool {
    node.kind == TokenKind::ColRef && node.text == "*"
}

/// Replaces every select-list subtree that names an aggregation (spec.md
/// §4.1 `aggregations`) with a plain reference to the column the group-by
/// stage already projected it under, so the select list compiles against
/// the post-group-by resolver instead of re-resolving the original
/// `Function` node (which the group-by stage, not the expression compiler,
/// owns — spec.md §4.5).
fn rewrite_select_for_aggregates(select_node: &AstNode, aggregations: &IndexMap<String, AstNode>) -> AstNode {
    let children = select_node
        .children
        .iter()
        .map(|c| match aggregations.get(&c.canonical_text()) {
            Some(agg) => AstNode::new(TokenKind::ColRef, agg.text.to_ascii_lowercase()),
            None => c.clone(),
        })
        .collect();
    select_node.clone().with_children(children)
}

/// Expands `*`/`alias.*` (spec.md §4.9 step 3) and compiles every select
/// item, returning the projected expressions alongside their output names.
fn expand_and_compile_select_list(select_node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<(Vec<Expr>, Vec<String>)> {
    let mut exprs = Vec::new();
    let mut names = Vec::new();

    for child in &select_node.children {
        if is_star(child) {
            if let Some(alias_node) = child.first_child_of_kind(TokenKind::Identifier) {
                for (col_name, info) in resolver.columns_for_alias_named(&alias_node.text) {
                    exprs.push(Expr::column(info.internal_name.clone(), info.ty.clone()));
                    names.push(col_name.to_string());
                }
            } else {
                for (_, col_name, info) in resolver.all_columns_full() {
                    exprs.push(Expr::column(info.internal_name.clone(), info.ty.clone()));
                    names.push(col_name.to_string());
                }
            }
        } else {
            let idx = exprs.len();
            exprs.push(compile_expr(child, resolver, functions)?);
            names.push(out_name(child, idx));
        }
    }
    Ok((exprs, names))
}

fn aggregator_spec(key: &str, node: &AstNode, distinct_key: Option<&str>, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<AggregatorSpec> {
    let args: Vec<Expr> = node
        .children
        .iter()
        .filter(|c| !(c.kind == TokenKind::Other && c.text == "DISTINCT"))
        .map(|c| compile_expr(c, resolver, functions))
        .collect::<Result<_>>()?;
    Ok(AggregatorSpec {
        udf_class: node.text.to_ascii_lowercase(),
        args,
        is_distinct: distinct_key == Some(key),
        alias: node.text.to_ascii_lowercase(),
    })
}

/// Steps 1-3 of spec.md §4.9: `WHERE` filter, group-by sub-plan, then the
/// projecting `Select`. Shared between the full per-destination body plan
/// and subquery realization, since a subquery stops exactly here.
fn plan_core(qb: &Qb, dest_name: &str, clause: &crate::ir::qb::DestClause, source: &Source, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<(OpId, RowResolver)> {
    let mut op = source.op;
    let mut resolver = source.resolver.clone();

    if let Some(where_ast) = &clause.where_expr {
        let predicate = compile_expr(where_ast, &resolver, ctx.functions)?;
        register_where_predicate(qb, &resolver, &predicate, session);
        let filter = graph.add(OpKind::Filter { predicate, is_sampling_pred: false });
        graph.link(op, filter);
        op = filter;
    }

    let has_group_by = !clause.group_by_exprs.is_empty();
    let has_aggs = !clause.aggregations.is_empty();
    if has_group_by || has_aggs {
        let keys: Vec<GroupByKey> = clause
            .group_by_exprs
            .iter()
            .enumerate()
            .map(|(i, e)| {
                Ok(GroupByKey {
                    expr: compile_expr(e, &resolver, ctx.functions)?,
                    alias: out_name(e, i),
                })
            })
            .collect::<Result<_>>()?;

        let distinct_key = clause.distinct_aggregation.as_ref().map(AstNode::canonical_text);
        let aggs: Vec<AggregatorSpec> = clause
            .aggregations
            .iter()
            .map(|(key, node)| aggregator_spec(key, node, distinct_key.as_deref(), &resolver, ctx.functions))
            .collect::<Result<_>>()?;

        let gby = groupby::plan(graph, op, &keys, &aggs, ctx.config.map_side_aggregate);
        op = gby;

        let mut columns: Vec<(String, TypeInfo)> = keys.iter().map(|k| (k.alias.clone(), k.expr.ty.clone())).collect();
        for (agg, spec) in clause.aggregations.values().zip(aggs.iter()) {
            let ty = spec.args.first().map(|a| a.ty.clone()).unwrap_or(TypeInfo::Primitive(crate::ir::types::PrimitiveType::Long));
            columns.push((agg.text.to_ascii_lowercase(), ty));
        }
        resolver = dense_resolver(columns);
    }

    let select_node = clause
        .select_exprs
        .as_ref()
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, format!("destination `{dest_name}` has no SELECT list")))?;

    if has_group_by {
        validate_non_key_exprs(select_node, &clause.group_by_exprs, &clause.aggregations)?;
    }

    let rewritten;
    let select_node = if has_group_by || has_aggs {
        rewritten = rewrite_select_for_aggregates(select_node, &clause.aggregations);
        &rewritten
    } else {
        select_node
    };
    let (exprs, names) = expand_and_compile_select_list(select_node, &resolver, ctx.functions)?;
    let select = graph.add(OpKind::Select { exprs: exprs.clone(), out_names: names.clone() });
    graph.link(op, select);
    session.top_sel_ops.push(select);

    let columns: Vec<(String, TypeInfo)> = names.into_iter().zip(exprs.iter().map(|e| e.ty.clone())).collect();
    Ok((select, dense_resolver(columns)))
}

/// spec.md §7 `NonKeyExprInGroupBy`: every non-aggregate select-list
/// expression must canonically match one of the group-by keys.
fn validate_non_key_exprs(select_node: &AstNode, group_by_exprs: &[AstNode], aggregations: &IndexMap<String, AstNode>) -> Result<()> {
    let key_texts: Vec<String> = group_by_exprs.iter().map(AstNode::canonical_text).collect();
    for child in &select_node.children {
        if is_star(child) || aggregations.contains_key(&child.canonical_text()) {
            continue;
        }
        if !key_texts.contains(&child.canonical_text()) {
            return Err(SemanticError::new(
                SemanticErrorKind::NonKeyExprInGroupBy,
                "select-list expression is neither aggregated nor a GROUP BY key",
            )
            .at(child.pos));
        }
    }
    Ok(())
}

/// Full spec.md §4.9 body plan for one destination: `plan_core`'s steps
/// 1-3, then `TRANSFORM`, `CLUSTER/DISTRIBUTE/SORT BY`, `LIMIT`, and the
/// final `FileSink` plus load-work bookkeeping.
fn gen_body_plan(qb: &Qb, dest_name: &str, clause: &crate::ir::qb::DestClause, source: &Source, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<OpId> {
    let (mut op, mut resolver) = plan_core(qb, dest_name, clause, source, graph, ctx, session)?;

    if let Some(transform) = &clause.transform {
        let script = graph.add(OpKind::Script { command: transform.text.clone() });
        graph.link(op, script);
        op = script;
        resolver = dense_resolver(vec![
            ("key".to_string(), TypeInfo::Primitive(crate::ir::types::PrimitiveType::String)),
            ("value".to_string(), TypeInfo::Primitive(crate::ir::types::PrimitiveType::String)),
        ]);
    }

    let shuffled = !clause.cluster_by_exprs.is_empty() || !clause.distribute_by_exprs.is_empty() || !clause.sort_by.is_empty();
    if shuffled {
        let sort_pairs: Vec<(Expr, SortDirection)> = if !clause.cluster_by_exprs.is_empty() {
            clause
                .cluster_by_exprs
                .iter()
                .map(|e| Ok((compile_expr(e, &resolver, ctx.functions)?, SortDirection::Asc)))
                .collect::<Result<_>>()?
        } else {
            clause
                .sort_by
                .iter()
                .map(|(e, d)| Ok((compile_expr(e, &resolver, ctx.functions)?, *d)))
                .collect::<Result<_>>()?
        };
        let partition_keys: Vec<Expr> = if !clause.cluster_by_exprs.is_empty() {
            sort_pairs.iter().map(|(e, _)| e.clone()).collect()
        } else if !clause.distribute_by_exprs.is_empty() {
            clause
                .distribute_by_exprs
                .iter()
                .map(|e| compile_expr(e, &resolver, ctx.functions))
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };
        let value_columns: Vec<(String, String, ColumnInfo)> = resolver
            .all_columns_full()
            .into_iter()
            .map(|(alias, col_name, info)| (alias.to_string(), col_name.to_string(), info.clone()))
            .collect();
        let value_exprs: Vec<Expr> = value_columns
            .iter()
            .map(|(_, _, info)| Expr::column(info.internal_name.clone(), info.ty.clone()))
            .collect();

        let rs = graph.add(OpKind::ReduceSink {
            keys: sort_pairs.iter().map(|(e, d)| ReduceSinkKey { expr: e.clone(), order: *d }).collect(),
            values: value_exprs,
            partition_keys,
            tag: 0,
            num_reducers: -1,
        });
        graph.link(op, rs);
        let extract = graph.add(OpKind::Extract { tag: 0 });
        graph.link(rs, extract);
        op = extract;

        // Model the reduce-sink's own VALUE.j output (spec.md §4.3) before
        // the extract operator re-exposes it as dense positional columns.
        let rs_resolver = reduce_sink_value_resolver(&value_columns);
        let columns: Vec<(String, TypeInfo)> = rs_resolver
            .all_columns_full()
            .into_iter()
            .map(|(_, name, info)| (name.to_string(), info.ty.clone()))
            .collect();
        resolver = dense_resolver(columns);
    }

    if let Some(n) = clause.limit {
        let limit = graph.add(OpKind::Limit { n });
        graph.link(op, limit);
        op = limit;

        if qb.is_query {
            let rs = graph.add(OpKind::ReduceSink {
                keys: Vec::new(),
                values: resolver
                    .all_columns_full()
                    .into_iter()
                    .map(|(_, _, info)| Expr::column(info.internal_name.clone(), info.ty.clone()))
                    .collect(),
                partition_keys: Vec::new(),
                tag: 0,
                num_reducers: 1,
            });
            graph.link(op, rs);
            let final_limit = graph.add(OpKind::Limit { n });
            graph.link(rs, final_limit);
            op = final_limit;
        }
    }

    finalize_destination(qb, dest_name, clause, op, &resolver, graph, ctx, session)
}

/// spec.md §4.9 step 7: a conversion `Select` when the target table's
/// column types differ from the projected schema, then the `FileSink` and
/// its `loadTableWork`/`loadFileWork` entry.
fn finalize_destination(qb: &Qb, dest_name: &str, clause: &crate::ir::qb::DestClause, mut op: OpId, resolver: &RowResolver, graph: &mut OpGraph, ctx: &PlanCtx, session: &mut AnalyzerSession) -> Result<OpId> {
    let scratch = session.next_scratch_path(dest_name);
    let (path, format) = match &clause.destination {
        Destination::Table { name, partition } => {
            let table = match qb.meta_data.tables.values().find(|t| &t.name == name) {
                Some(t) => t.clone(),
                None => ctx.catalog.get_table(name)?,
            };
            op = convert_for_table(&table, op, resolver, graph, ctx.functions)?;
            session.load_table_work.push(LoadTableWork {
                source_dir: scratch.clone(),
                table_name: name.clone(),
                partition_spec: partition.clone(),
                is_overwrite: true,
            });
            (scratch, table.output_format.clone())
        }
        Destination::File { path } => {
            session.load_file_work.push(LoadFileWork {
                source_dir: scratch,
                target_dir: path.clone(),
                is_overwrite: true,
            });
            (path.clone(), FileFormat::Text)
        }
        Destination::Unresolved => {
            return Err(SemanticError::new(
                SemanticErrorKind::Generic,
                format!("destination `{dest_name}` was never bound to a concrete target"),
            ))
        }
    };

    let sink = graph.add(OpKind::FileSink {
        path,
        format,
        compress: ctx.config.compress_result,
    });
    graph.link(op, sink);
    Ok(sink)
}

fn convert_for_table(table: &Table, op: OpId, resolver: &RowResolver, graph: &mut OpGraph, functions: &dyn FunctionRegistry) -> Result<OpId> {
    let current: Vec<(String, Expr)> = resolver
        .all_columns_full()
        .into_iter()
        .map(|(_, name, info)| (name.to_string(), Expr::column(info.internal_name.clone(), info.ty.clone())))
        .collect();

    let needs_conversion = current
        .iter()
        .zip(table.schema.iter())
        .any(|((_, expr), col)| expr.ty != col.ty);
    if !needs_conversion {
        return Ok(op);
    }

    let mut exprs = Vec::with_capacity(current.len());
    let mut names = Vec::with_capacity(current.len());
    for (i, (name, expr)) in current.into_iter().enumerate() {
        let converted = match table.schema.get(i) {
            Some(col) if col.ty != expr.ty => {
                let target_name = col.ty.as_primitive().map(|p| p.type_name()).unwrap_or("");
                match functions.conversion_udf(target_name, &expr.ty) {
                    Some(udf) => Expr::func(udf, "evaluate", vec![expr], false, col.ty.clone()),
                    None => expr,
                }
            }
            _ => expr,
        };
        exprs.push(converted);
        names.push(name);
    }
    let select = graph.add(OpKind::Select { exprs, out_names: names });
    graph.link(op, select);
    Ok(select)
}
