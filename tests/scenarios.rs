//! End-to-end scenarios (spec.md §8), one `#[test]` per scenario, each
//! asserting on the shape of the `TaskGraph` (or error) the full pipeline
//! produces. Grounded on `phase1::analyzer`'s own hand-built AST fixtures —
//! the same `colref`/`tabref` shape, extended here with a `func` helper for
//! aggregation nodes and driven through the crate's public `compile`/
//! `analyze`/`plan_tasks` entry points rather than `phase1::analyze` alone.

use relplan::ast::{AstNode, TokenKind};
use relplan::config::{Config, PruningMode};
use relplan::error::SemanticErrorKind;
use relplan::ir::operator::OpKind;
use relplan::ir::task::Task;
use relplan::metastore::{BuiltinRegistry, ColumnSchema, FileFormat, Partition};
use relplan::testutil::{leaf, node, FixtureMetastore};
use relplan::AnalyzerSession;

fn colref(alias: &str, col: &str) -> AstNode {
    leaf(TokenKind::ColRef, col).with_children(vec![leaf(TokenKind::Identifier, alias)])
}

fn colref_plain(col: &str) -> AstNode {
    leaf(TokenKind::ColRef, col)
}

fn tabref(name: &str, alias: &str) -> AstNode {
    leaf(TokenKind::TabRef, name).with_children(vec![leaf(TokenKind::Identifier, alias)])
}

fn tabref_plain(name: &str) -> AstNode {
    leaf(TokenKind::TabRef, name)
}

fn func(name: &str, children: Vec<AstNode>) -> AstNode {
    AstNode::new(TokenKind::Function, name).with_children(children)
}

fn equal(lhs: AstNode, rhs: AstNode) -> AstNode {
    AstNode::new(TokenKind::Equal, "").with_children(vec![lhs, rhs])
}

// Scenario 1: SELECT * FROM t, t unpartitioned -> one Fetch task.
#[test]
fn select_star_over_unpartitioned_table_is_a_single_fetch_task() {
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            node(TokenKind::Select, vec![colref_plain("*")]),
        ],
    );
    let catalog = FixtureMetastore::with_unpartitioned_table("t");
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s1");
    let config = Config::new();

    let (_, _, tasks) = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap();
    assert_eq!(tasks.tasks.len(), 1);
    assert!(matches!(tasks.tasks[0], Task::Fetch(_)));
}

// Scenario 2: SELECT key, count(1) FROM t GROUP BY key, map-side aggregate
// disabled -> 2-MR plan (RS -> GBY(PARTIAL1) -> RS -> GBY(FINAL)).
#[test]
fn group_by_without_map_side_aggregate_cuts_into_two_mr_jobs() {
    let count_1 = func("count", vec![leaf(TokenKind::Number, "1")]);
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            node(TokenKind::Select, vec![colref_plain("key"), count_1]),
            node(TokenKind::GroupBy, vec![colref_plain("key")]),
        ],
    );
    let catalog = FixtureMetastore::with_unpartitioned_table("t");
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s2");
    let config = Config::new().with_map_side_aggregate(false);

    let (_, graph, tasks) = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap();

    let jobs: Vec<_> = tasks
        .tasks
        .iter()
        .map(|t| match t {
            Task::MrJob(j) => j,
            Task::Fetch(_) => panic!("expected MrJob tasks only"),
        })
        .collect();
    assert_eq!(jobs.len(), 2);

    let job0 = jobs.iter().find(|j| j.depends_on.is_empty()).expect("a root job");
    let job1 = jobs.iter().find(|j| !j.depends_on.is_empty()).expect("a dependent job");
    assert_eq!(job1.depends_on, vec![job0.id]);

    assert!(matches!(graph.get(job0.map_root).kind, OpKind::TableScan { .. }));
    let reduce_root = job0.reduce_root.expect("job0 shuffles into a GroupBy");
    match &graph.get(reduce_root).kind {
        OpKind::GroupBy { mode, .. } => assert!(matches!(mode, relplan::metastore::AggregateMode::Partial1)),
        other => panic!("expected GroupBy(PARTIAL1), got {other:?}"),
    }
    match &graph.get(job1.map_root).kind {
        OpKind::GroupBy { mode, .. } => assert!(matches!(mode, relplan::metastore::AggregateMode::Final)),
        other => panic!("expected job1 rooted at GroupBy(FINAL), got {other:?}"),
    }

    // The first shuffle partitions randomly (empty partition keys), since
    // there is no DISTINCT aggregate to co-locate by.
    let rs1 = graph.get(reduce_root).parents[0];
    match &graph.get(rs1).kind {
        OpKind::ReduceSink { partition_keys, .. } => assert!(partition_keys.is_empty()),
        other => panic!("expected ReduceSink, got {other:?}"),
    }
}

// Scenario 3: SELECT count(DISTINCT x) FROM t -> 2-MR plan where the first
// shuffle partitions on x (not randomly).
#[test]
fn distinct_aggregate_partitions_first_shuffle_on_the_distinct_column() {
    let count_distinct_x = func("count", vec![leaf(TokenKind::Other, "DISTINCT"), colref_plain("value")]);
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            node(TokenKind::Select, vec![count_distinct_x]),
        ],
    );
    let catalog = FixtureMetastore::with_unpartitioned_table("t");
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s3");
    let config = Config::new().with_map_side_aggregate(false);

    let (_, graph, tasks) = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap();

    let jobs: Vec<_> = tasks
        .tasks
        .iter()
        .map(|t| match t {
            Task::MrJob(j) => j,
            Task::Fetch(_) => panic!("expected MrJob tasks only"),
        })
        .collect();
    assert_eq!(jobs.len(), 2);

    let job0 = jobs.iter().find(|j| j.depends_on.is_empty()).expect("a root job");
    let reduce_root = job0.reduce_root.expect("job0 shuffles into a GroupBy");
    let rs1 = graph.get(reduce_root).parents[0];
    match &graph.get(rs1).kind {
        OpKind::ReduceSink { partition_keys, .. } => assert!(!partition_keys.is_empty()),
        other => panic!("expected ReduceSink, got {other:?}"),
    }
}

// Scenario 4: a JOIN b ON a.k = b.k JOIN c ON a.k = c.k -> merges into a
// single 3-way Join with three ReduceSink inputs tagged 0, 1, 2.
#[test]
fn three_way_join_on_shared_key_merges_into_one_join_operator() {
    let ab = AstNode::new(TokenKind::Join, "").with_children(vec![
        tabref("a", "a"),
        tabref("b", "b"),
        node(TokenKind::JoinCond, vec![equal(colref("a", "k"), colref("b", "k"))]),
    ]);
    let abc = AstNode::new(TokenKind::Join, "").with_children(vec![
        ab,
        tabref("c", "c"),
        node(TokenKind::JoinCond, vec![equal(colref("a", "k"), colref("c", "k"))]),
    ]);
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![abc]),
            node(TokenKind::Select, vec![colref("a", "x")]),
        ],
    );

    fn table_with_k_and_x(name: &str) -> relplan::metastore::Table {
        relplan::metastore::Table {
            name: name.to_string(),
            schema: vec![
                ColumnSchema {
                    name: "k".to_string(),
                    ty: relplan::ir::types::TypeInfo::Primitive(relplan::ir::types::PrimitiveType::Integer),
                },
                ColumnSchema {
                    name: "x".to_string(),
                    ty: relplan::ir::types::TypeInfo::Primitive(relplan::ir::types::PrimitiveType::Integer),
                },
            ],
            partition_cols: vec![],
            bucket_cols: vec![],
            num_buckets: None,
            input_format: FileFormat::Text,
            output_format: FileFormat::Text,
            location: format!("/warehouse/{name}"),
        }
    }

    let catalog = FixtureMetastore::new()
        .with_table(table_with_k_and_x("a"))
        .with_table(table_with_k_and_x("b"))
        .with_table(table_with_k_and_x("c"));
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s4");
    let config = Config::new();

    let (_, graph, _) = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap();

    let joins: Vec<_> = graph.iter().filter(|op| matches!(op.kind, OpKind::Join { .. })).collect();
    assert_eq!(joins.len(), 1, "binary joins sharing a left key must merge into one");
    let join = joins[0];
    match &join.kind {
        OpKind::Join { key_exprs, outer_sides, .. } => {
            assert_eq!(key_exprs.len(), 3);
            assert_eq!(outer_sides.len(), 3);
            assert!(key_exprs.iter().all(|side| side.len() == 1));
        }
        _ => unreachable!(),
    }
    assert_eq!(join.parents.len(), 3);
    let mut tags: Vec<i32> = join
        .parents
        .iter()
        .map(|&p| match &graph.get(p).kind {
            OpKind::ReduceSink { tag, .. } => *tag,
            other => panic!("join input should be a ReduceSink, got {other:?}"),
        })
        .collect();
    tags.sort();
    assert_eq!(tags, vec![0, 1, 2]);
}

// Scenario 5: SELECT * FROM t TABLESAMPLE(BUCKET 3 OUT OF 32), t clustered
// on userid into 32 buckets -> input pruning alone selects bucket 2 (0-based),
// no predicate needed. Same sample over a 16-bucket table -> 32 doesn't
// divide evenly, so a hash predicate over the bucketing column is required.
#[test]
fn tablesample_over_dividing_bucket_count_needs_no_predicate() {
    let sample = leaf(TokenKind::TableSample, "3/32");
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t").with_children(vec![sample])]),
            node(TokenKind::Select, vec![colref_plain("*")]),
        ],
    );
    let table = relplan::metastore::Table {
        name: "t".to_string(),
        schema: vec![ColumnSchema {
            name: "userid".to_string(),
            ty: relplan::ir::types::TypeInfo::Primitive(relplan::ir::types::PrimitiveType::Integer),
        }],
        partition_cols: vec![],
        bucket_cols: vec!["userid".to_string()],
        num_buckets: Some(32),
        input_format: FileFormat::Text,
        output_format: FileFormat::Text,
        location: "/warehouse/t".to_string(),
    };
    let catalog = FixtureMetastore::new().with_table(table);
    let mut session = AnalyzerSession::new("s5a");

    let qb = relplan::analyze(&query, &catalog, &mut session).unwrap();
    let spec = qb.alias_to_sample.get("t").expect("TABLESAMPLE attached to alias `t`");
    let table = qb.meta_data.tables.get("t").expect("table bound");
    let decision = relplan::pruner::plan_sample(table, spec.bucket_num, spec.total_buckets, &[]);

    assert!(decision.input_pruning_suffices);
    assert_eq!(decision.selected_buckets, vec![2]);
    assert!(decision.predicate_columns.is_empty());
}

#[test]
fn tablesample_over_non_dividing_bucket_count_needs_a_hash_predicate() {
    let sample = leaf(TokenKind::TableSample, "3/32");
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t").with_children(vec![sample])]),
            node(TokenKind::Select, vec![colref_plain("*")]),
        ],
    );
    let table = relplan::metastore::Table {
        name: "t".to_string(),
        schema: vec![ColumnSchema {
            name: "userid".to_string(),
            ty: relplan::ir::types::TypeInfo::Primitive(relplan::ir::types::PrimitiveType::Integer),
        }],
        partition_cols: vec![],
        bucket_cols: vec!["userid".to_string()],
        num_buckets: Some(16),
        input_format: FileFormat::Text,
        output_format: FileFormat::Text,
        location: "/warehouse/t".to_string(),
    };
    let catalog = FixtureMetastore::new().with_table(table);
    let mut session = AnalyzerSession::new("s5b");

    let qb = relplan::analyze(&query, &catalog, &mut session).unwrap();
    let spec = qb.alias_to_sample.get("t").expect("TABLESAMPLE attached to alias `t`");
    let table = qb.meta_data.tables.get("t").expect("table bound");
    let decision = relplan::pruner::plan_sample(table, spec.bucket_num, spec.total_buckets, &[]);

    assert!(!decision.input_pruning_suffices);
    assert_eq!(decision.predicate_columns, vec!["userid".to_string()]);
    assert!(decision.selected_buckets.is_empty());
}

// Scenario 6: SELECT x FROM t WHERE dt='2009-01-01', dt the only partition
// column, strict mode -> succeeds; with no predicate at all, strict mode
// rejects with NoPartitionPredicate.
#[test]
fn strict_pruning_accepts_a_partition_predicate() {
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            node(TokenKind::Select, vec![colref_plain("key")]),
            node(
                TokenKind::Where,
                vec![equal(colref_plain("dt"), leaf(TokenKind::StringLiteral, "2009-01-01"))],
            ),
        ],
    );
    let catalog = FixtureMetastore::with_partitioned_table("t", "dt").with_partitions(
        "t",
        vec![
            Partition {
                values: vec![relplan::ir::expr::Constant::String("2009-01-01".to_string())],
                location: "/t/dt=2009-01-01".to_string(),
            },
            Partition {
                values: vec![relplan::ir::expr::Constant::String("2009-01-02".to_string())],
                location: "/t/dt=2009-01-02".to_string(),
            },
        ],
    );
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s6a");
    let config = Config::new().with_partition_pruning(PruningMode::Strict);

    let (_, _, tasks) = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap();
    assert_eq!(tasks.tasks.len(), 1);
}

#[test]
fn strict_pruning_rejects_a_partitioned_table_with_no_predicate_at_all() {
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            node(TokenKind::Select, vec![colref_plain("key")]),
        ],
    );
    let catalog = FixtureMetastore::with_partitioned_table("t", "dt");
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s6b");
    let config = Config::new().with_partition_pruning(PruningMode::Strict);

    let qb = relplan::analyze(&query, &catalog, &mut session).unwrap();
    let mut graph = relplan::plan_operators(&qb, &catalog, &functions, &mut session, &config).unwrap();
    let err = relplan::plan_tasks(&qb, &mut graph, &catalog, &mut session, &config).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::NoPartitionPredicate);
}

// Scenario 7: SELECT DISTINCT a, b FROM t GROUP BY a, b -> rejected.
#[test]
fn select_distinct_with_group_by_is_rejected_end_to_end() {
    let select = AstNode::new(TokenKind::SelectDistinct, "").with_children(vec![colref_plain("a"), colref_plain("b")]);
    let query = node(
        TokenKind::Query,
        vec![
            node(TokenKind::From, vec![tabref_plain("t")]),
            select,
            node(TokenKind::GroupBy, vec![colref_plain("a"), colref_plain("b")]),
        ],
    );
    let catalog = FixtureMetastore::with_unpartitioned_table("t");
    let functions = BuiltinRegistry;
    let mut session = AnalyzerSession::new("s7");
    let config = Config::new();

    let err = relplan::compile(&query, &catalog, &functions, &mut session, &config).unwrap_err();
    assert_eq!(err.kind, SemanticErrorKind::SelectDistinctWithGroupBy);
}
