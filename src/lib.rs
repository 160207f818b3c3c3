//! A query compiler core: turns a parsed SQL-like AST over partitioned,
//! bucketed tables into a typed operator tree and a dependency graph of
//! map/reduce (or fetch) tasks.
//!
//! The pipeline mirrors the teacher's own staged compiler (`PL -> RQ ->
//! SQL`), just with different stage names and a different target:
//!
//! 1. [`phase1`] walks the AST once and builds a [`ir::qb::Qb`] tree —
//!    per-clause metadata (`SELECT`/`WHERE`/`GROUP BY`/join tree/...)
//!    without touching any external catalog.
//! 2. [`binder`] resolves every table alias and destination against the
//!    [`metastore::Metastore`] collaborator.
//! 3. [`opplanner`] lowers the bound `Qb` tree into an [`ir::operator::OpGraph`]
//!    — a DAG of typed relational operators.
//! 4. [`mrplanner`] cuts that DAG at shuffle boundaries into an
//!    [`ir::task::TaskGraph`], or collapses it into a single fetch task when
//!    the fast path applies.
//!
//! [`pruner::PartitionPruner`] and the expression compiler ([`exprcompiler`])
//! are used internally by steps 3 and 4, not as separate pipeline stages.
//! All mutable per-query bookkeeping (id generators, scratch-path counters,
//! accumulated pruners and load work) lives in one [`session::AnalyzerSession`],
//! owned by the caller and never shared across queries.

pub mod ast;
mod binder;
pub mod config;
pub mod error;
pub mod error_message;
pub mod explain;
pub mod exprcompiler;
pub mod groupby;
pub mod ir;
pub mod join;
pub mod metastore;
pub mod mrplanner;
pub mod opplanner;
pub mod phase1;
pub mod pruner;
pub mod rowresolver;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;
mod utils;

pub use config::Config;
pub use error::{Result, SemanticError, SemanticErrorKind};
pub use ir::operator::OpGraph;
pub use ir::qb::{Qb, QbExpr};
pub use ir::task::TaskGraph;
pub use session::AnalyzerSession;

use ast::AstNode;
use metastore::{FunctionRegistry, Metastore};

/// Runs phase-1 analysis and binds every table alias / destination in the
/// result against `catalog`. Rejects a top-level `UNION` before it ever
/// reaches here (spec.md §4.1), so the returned tree is always a single
/// `Qb`, not a `QbExpr`.
pub fn analyze(ast: &AstNode, catalog: &dyn Metastore, session: &mut AnalyzerSession) -> Result<Qb> {
    let mut qb = match phase1::analyze(ast)? {
        QbExpr::Single(qb) => *qb,
        QbExpr::UnionAll(..) => unreachable!("phase1::analyze rejects a top-level UNION"),
    };
    binder::bind_tables(&mut qb, catalog)?;
    binder::bind_destinations(&mut qb, catalog, session)?;
    Ok(qb)
}

/// Lowers a bound `Qb` into an operator DAG (spec.md §4.9).
pub fn plan_operators(qb: &Qb, catalog: &dyn Metastore, functions: &dyn FunctionRegistry, session: &mut AnalyzerSession, config: &Config) -> Result<OpGraph> {
    opplanner::gen_plan(qb, catalog, functions, session, config)
}

/// Cuts an operator DAG into a task dependency graph, or a single fetch
/// task when the fast path applies (spec.md §4.10).
pub fn plan_tasks(qb: &Qb, graph: &mut OpGraph, catalog: &dyn Metastore, session: &mut AnalyzerSession, config: &Config) -> Result<TaskGraph> {
    mrplanner::plan_tasks(qb, graph, catalog, session, config)
}

/// Runs the full pipeline: analyze, bind, plan operators, plan tasks.
pub fn compile(
    ast: &AstNode,
    catalog: &dyn Metastore,
    functions: &dyn FunctionRegistry,
    session: &mut AnalyzerSession,
    config: &Config,
) -> Result<(Qb, OpGraph, TaskGraph)> {
    let qb = analyze(ast, catalog, session)?;
    let mut graph = plan_operators(&qb, catalog, functions, session, config)?;
    let tasks = plan_tasks(&qb, &mut graph, catalog, session, config)?;
    Ok((qb, graph, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::TokenKind;
    use metastore::BuiltinRegistry;
    use testutil::{leaf, node, FixtureMetastore};

    fn select_star_query(table: &str) -> AstNode {
        node(
            TokenKind::Query,
            vec![
                node(TokenKind::From, vec![leaf(TokenKind::TabRef, table)]),
                node(TokenKind::Select, vec![leaf(TokenKind::ColRef, "*")]),
            ],
        )
    }

    #[test]
    fn compiles_select_star_into_a_fetch_task() {
        let ast = select_star_query("orders");
        let catalog = FixtureMetastore::with_unpartitioned_table("orders");
        let functions = BuiltinRegistry;
        let mut session = AnalyzerSession::new("sess1");
        let config = Config::new();

        let (_, _, tasks) = compile(&ast, &catalog, &functions, &mut session, &config).unwrap();
        assert_eq!(tasks.tasks.len(), 1);
        assert!(matches!(tasks.tasks[0], ir::task::Task::Fetch(_)));
    }
}
