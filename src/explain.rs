//! Plain-text `EXPLAIN`-style rendering of the operator tree and task graph
//! (SPEC_FULL.md §15), in the spirit of the teacher's `debug::render_html` —
//! scaled down to a dependency-free text renderer since there is no
//! CLI/webview layer in scope here.

use std::fmt;

use crate::ir::expr::Expr;
use crate::ir::operator::{OpGraph, OpId, OpKind, Operator};
use crate::ir::task::{Task, TaskGraph};

fn render_expr(e: &Expr) -> String {
    e.canonical_text()
}

fn render_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(render_expr).collect::<Vec<_>>().join(", ")
}

fn describe(op: &Operator) -> String {
    match &op.kind {
        OpKind::TableScan { alias, table, needed_columns } => {
            format!("TableScan {} as {alias} (needed: [{}])", table.name, needed_columns.join(", "))
        }
        OpKind::Filter { predicate, is_sampling_pred } => {
            format!(
                "Filter {}{}",
                render_expr(predicate),
                if *is_sampling_pred { " [sampling]" } else { "" }
            )
        }
        OpKind::Select { exprs, out_names } => {
            let items: Vec<_> = exprs.iter().zip(out_names).map(|(e, n)| format!("{} as {n}", render_expr(e))).collect();
            format!("Select [{}]", items.join(", "))
        }
        OpKind::GroupBy { mode, keys, aggregators } => {
            let keys: Vec<_> = keys.iter().map(|k| format!("{} as {}", render_expr(&k.expr), k.alias)).collect();
            let aggs: Vec<_> = aggregators
                .iter()
                .map(|a| format!("{}{}({}) as {}", a.udf_class, if a.is_distinct { "(distinct)" } else { "" }, render_exprs(&a.args), a.alias))
                .collect();
            format!("GroupBy {mode:?} keys=[{}] aggs=[{}]", keys.join(", "), aggs.join(", "))
        }
        OpKind::ReduceSink { keys, partition_keys, tag, num_reducers, .. } => {
            let keys: Vec<_> = keys.iter().map(|k| format!("{} {:?}", render_expr(&k.expr), k.order)).collect();
            format!(
                "ReduceSink tag={tag} reducers={num_reducers} sort=[{}] partition=[{}]",
                keys.join(", "),
                render_exprs(partition_keys)
            )
        }
        OpKind::Join { key_exprs, outer_sides, .. } => {
            let sides: Vec<_> = key_exprs
                .iter()
                .zip(outer_sides)
                .map(|(keys, outer)| format!("[{}]{}", render_exprs(keys), if *outer { " (outer)" } else { "" }))
                .collect();
            format!("Join({}-way) {}", key_exprs.len(), sides.join(" = "))
        }
        OpKind::FileSink { path, format, compress } => {
            format!("FileSink {path} ({format:?}{})", if *compress { ", compressed" } else { "" })
        }
        OpKind::Limit { n } => format!("Limit {n}"),
        OpKind::Forward => "Forward".to_string(),
        OpKind::Script { command } => format!("Script `{command}`"),
        OpKind::Extract { tag } => format!("Extract tag={tag}"),
    }
}

/// Renders every operator reachable from `graph`'s roots as an indented
/// tree. An operator with more than one parent (a `Join`'s inputs converge
/// on it) is rendered in full only at its first visit; later visits print a
/// `-> #id` back-reference instead of repeating the subtree.
fn render_from(graph: &OpGraph, id: OpId, depth: usize, seen: &mut std::collections::HashSet<OpId>, out: &mut String) {
    let indent = "  ".repeat(depth);
    let op = graph.get(id);
    if !seen.insert(id) {
        out.push_str(&format!("{indent}-> #{} (see above)\n", id.0));
        return;
    }
    out.push_str(&format!("{indent}#{} {}\n", id.0, describe(op)));
    for &child in &op.children {
        render_from(graph, child, depth + 1, seen, out);
    }
}

impl fmt::Display for OpGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = std::collections::HashSet::new();
        let mut out = String::new();
        for root in self.roots() {
            render_from(self, root, 0, &mut seen, &mut out);
        }
        write!(f, "{out}")
    }
}

impl OpGraph {
    /// Convenience alias for `to_string()`, matching the teacher's
    /// `pretty()` naming on its own renderable IRs.
    pub fn pretty(&self) -> String {
        self.to_string()
    }
}

fn describe_task(task: &Task) -> String {
    match task {
        Task::Fetch(t) => format!(
            "Fetch #{} root=#{}{}",
            t.id.0,
            t.root.0,
            t.limit.map(|n| format!(" limit={n}")).unwrap_or_default()
        ),
        Task::MrJob(t) => {
            let reduce = t.reduce_root.map(|r| format!(" reduce_root=#{}", r.0)).unwrap_or_default();
            let deps: Vec<_> = t.depends_on.iter().map(|d| format!("#{}", d.0)).collect();
            format!(
                "MrJob #{} map_root=#{}{reduce} reducers={} depends_on=[{}]",
                t.id.0,
                t.map_root.0,
                t.num_reducers,
                deps.join(", ")
            )
        }
    }
}

impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.topo_order() {
            let task = self.tasks.iter().find(|t| t.id() == id).expect("topo_order only returns known ids");
            writeln!(f, "{}", describe_task(task))?;
        }
        Ok(())
    }
}

impl TaskGraph {
    pub fn pretty(&self) -> String {
        self.to_string()
    }
}
