//! The single AST traversal populating `QB`s (spec.md §4.1).
//!
//! Grounded on the teacher's `parser::pl` construction pass: one function
//! per syntactic shape, dispatched by node kind, building an owned IR tree
//! bottom-up rather than mutating a shared visitor context. Kept
//! deliberately unaware of types or the metastore — those are the
//! expression compiler's and metadata binder's jobs (spec.md §4.2, §4.4).

use log::debug;

use crate::ast::{AstNode, TokenKind};
use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::qb::{Destination, JoinTreeNode, JoinType, Qb, QbExpr, SampleSpec, SortDirection};

const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "min", "max", "avg"];

/// Entry point: analyzes a top-level query AST (never a bare `UNION`,
/// spec.md §4.1 "UNION allowed only when inside a subquery").
pub fn analyze(ast: &AstNode) -> Result<QbExpr> {
    analyze_qb_expr(ast, false)
}

fn analyze_qb_expr(ast: &AstNode, is_sub_query: bool) -> Result<QbExpr> {
    match ast.kind {
        TokenKind::Union | TokenKind::UnionAll => {
            if !is_sub_query {
                return Err(SemanticError::new(
                    SemanticErrorKind::UnionNotInSubquery,
                    "top-level UNION is not supported",
                )
                .at(ast.pos));
            }
            let lhs = analyze_qb_expr(ast.child(0).ok_or_else(|| missing_child(ast, "left union branch"))?, is_sub_query)?;
            let rhs = analyze_qb_expr(ast.child(1).ok_or_else(|| missing_child(ast, "right union branch"))?, is_sub_query)?;
            Ok(QbExpr::UnionAll(Box::new(lhs), Box::new(rhs)))
        }
        TokenKind::Query => {
            let mut qb = Qb::new("", None, is_sub_query);
            walk_query_body(ast, &mut qb)?;
            qb.check_alias_uniqueness().map_err(|alias| {
                SemanticError::new(
                    SemanticErrorKind::InvalidTableAlias,
                    format!("alias `{alias}` is used more than once"),
                )
                .at(ast.pos)
            })?;
            debug!("analyzed query block with {} destinations", qb.parse_info.len());
            Ok(QbExpr::Single(Box::new(qb)))
        }
        other => Err(SemanticError::new(
            SemanticErrorKind::Generic,
            format!("expected a query or union node, got {other:?}"),
        )
        .at(ast.pos)),
    }
}

fn missing_child(node: &AstNode, what: &str) -> SemanticError {
    SemanticError::new(SemanticErrorKind::Generic, format!("{what} missing under {:?}", node.kind)).at(node.pos)
}

fn walk_query_body(ast: &AstNode, qb: &mut Qb) -> Result<()> {
    if let Some(from) = ast.first_child_of_kind(TokenKind::From) {
        let src = from.child(0).ok_or_else(|| missing_child(from, "FROM source"))?;
        process_from_source(src, qb)?;
    }

    let mut current_dest: Option<String> = None;
    for child in &ast.children {
        debug!("phase-1 dispatch on {:?}", child.kind);
        match child.kind {
            TokenKind::From => {}

            TokenKind::Destination => {
                let name = qb.next_dest_name();
                bind_destination_ast(child, qb, &name)?;
                current_dest = Some(name);
            }

            TokenKind::Select | TokenKind::SelectDistinct => {
                let name = ensure_dest(qb, &mut current_dest);
                let is_distinct = child.kind == TokenKind::SelectDistinct;
                {
                    let clause = qb.dest_mut(&name);
                    clause.is_select_distinct = is_distinct;
                    clause.select_exprs = Some(child.clone());
                }
                collect_aggregations(child, qb.dest_mut(&name))?;
                let clause = qb.dest_mut(&name);
                if clause.is_select_distinct && !clause.group_by_exprs.is_empty() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::SelectDistinctWithGroupBy,
                        "SELECT DISTINCT cannot be combined with GROUP BY",
                    )
                    .at(child.pos));
                }
            }

            TokenKind::Where => {
                let name = ensure_dest(qb, &mut current_dest);
                let pred = child.child(0).ok_or_else(|| missing_child(child, "WHERE predicate"))?;
                qb.dest_mut(&name).where_expr = Some(pred.clone());
            }

            TokenKind::GroupBy => {
                let name = ensure_dest(qb, &mut current_dest);
                check_no_duplicate_keys(&child.children)?;
                let clause = qb.dest_mut(&name);
                if clause.is_select_distinct {
                    return Err(SemanticError::new(
                        SemanticErrorKind::SelectDistinctWithGroupBy,
                        "SELECT DISTINCT cannot be combined with GROUP BY",
                    )
                    .at(child.pos));
                }
                clause.group_by_exprs = child.children.clone();
            }

            TokenKind::ClusterBy => {
                let name = ensure_dest(qb, &mut current_dest);
                let clause = qb.dest_mut(&name);
                if !clause.distribute_by_exprs.is_empty() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::ClusterByDistributeByConflict,
                        "CLUSTER BY cannot be combined with DISTRIBUTE BY",
                    )
                    .at(child.pos));
                }
                if !clause.sort_by.is_empty() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::ClusterBySortByConflict,
                        "CLUSTER BY cannot be combined with SORT BY",
                    )
                    .at(child.pos));
                }
                clause.cluster_by_exprs = child.children.clone();
            }

            TokenKind::DistributeBy => {
                let name = ensure_dest(qb, &mut current_dest);
                let clause = qb.dest_mut(&name);
                if !clause.cluster_by_exprs.is_empty() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::ClusterByDistributeByConflict,
                        "DISTRIBUTE BY cannot be combined with CLUSTER BY",
                    )
                    .at(child.pos));
                }
                clause.distribute_by_exprs = child.children.clone();
            }

            TokenKind::SortBy => {
                let name = ensure_dest(qb, &mut current_dest);
                let clause = qb.dest_mut(&name);
                if !clause.cluster_by_exprs.is_empty() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::ClusterBySortByConflict,
                        "SORT BY cannot be combined with CLUSTER BY",
                    )
                    .at(child.pos));
                }
                clause.sort_by = child.children.iter().cloned().map(|c| (c, SortDirection::Asc)).collect();
            }

            TokenKind::Limit => {
                let name = ensure_dest(qb, &mut current_dest);
                let n: u64 = child.text.parse().map_err(|_| {
                    SemanticError::new(SemanticErrorKind::Generic, format!("invalid LIMIT value `{}`", child.text)).at(child.pos)
                })?;
                qb.dest_mut(&name).limit = Some(n);
            }

            TokenKind::Transform => {
                let name = ensure_dest(qb, &mut current_dest);
                qb.dest_mut(&name).transform = Some(child.clone());
            }

            TokenKind::Union | TokenKind::UnionAll => {
                if !qb.is_sub_query {
                    return Err(SemanticError::new(
                        SemanticErrorKind::UnionNotInSubquery,
                        "UNION is only permitted inside a subquery",
                    )
                    .at(child.pos));
                }
            }

            _ => {}
        }
    }
    Ok(())
}

fn ensure_dest(qb: &mut Qb, current: &mut Option<String>) -> String {
    if current.is_none() {
        *current = Some(qb.next_dest_name());
    }
    current.clone().unwrap()
}

fn check_no_duplicate_keys(exprs: &[AstNode]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for e in exprs {
        if !seen.insert(e.canonical_text()) {
            return Err(SemanticError::new(
                SemanticErrorKind::DuplicateGroupByKey,
                "the same expression appears twice in GROUP BY",
            )
            .at(e.pos));
        }
    }
    Ok(())
}

fn collect_aggregations(select_node: &AstNode, clause: &mut crate::ir::qb::DestClause) -> Result<()> {
    let mut distinct_key: Option<String> = None;
    walk_for_aggregations(select_node, clause, &mut distinct_key)
}

fn walk_for_aggregations(
    node: &AstNode,
    clause: &mut crate::ir::qb::DestClause,
    distinct_key: &mut Option<String>,
) -> Result<()> {
    if node.kind == TokenKind::Function && AGGREGATE_FUNCTIONS.contains(&node.text.to_ascii_lowercase().as_str()) {
        let key = node.canonical_text();
        clause.aggregations.insert(key.clone(), node.clone());
        if is_distinct_marker(node) {
            match distinct_key {
                Some(prev) if *prev != key => {
                    return Err(SemanticError::new(
                        SemanticErrorKind::UnsupportedMultipleDistincts,
                        "multiple DISTINCT aggregates over different arguments are not supported",
                    )
                    .at(node.pos));
                }
                _ => {
                    *distinct_key = Some(key);
                    clause.distinct_aggregation = Some(node.clone());
                }
            }
        }
    }
    for c in &node.children {
        walk_for_aggregations(c, clause, distinct_key)?;
    }
    Ok(())
}

fn is_distinct_marker(node: &AstNode) -> bool {
    matches!(node.children.first(), Some(c) if c.kind == TokenKind::Other && c.text == "DISTINCT")
}

fn bind_destination_ast(node: &AstNode, qb: &mut Qb, dest_name: &str) -> Result<()> {
    let destination = if let Some(tab) = node.first_child_of_kind(TokenKind::TabRef) {
        Destination::Table {
            name: tab.text.clone(),
            partition: Vec::new(),
        }
    } else if let Some(ident) = node.first_child_of_kind(TokenKind::Identifier) {
        Destination::File {
            path: ident.text.clone(),
        }
    } else {
        Destination::Unresolved
    };

    if qb.is_sub_query && !matches!(destination, Destination::Unresolved) {
        return Err(SemanticError::new(
            SemanticErrorKind::NoInsertInSubquery,
            "a subquery may not write to a table, partition, or directory",
        )
        .at(node.pos));
    }

    qb.dest_mut(dest_name).destination = destination;
    Ok(())
}

fn process_from_source(node: &AstNode, qb: &mut Qb) -> Result<()> {
    match node.kind {
        TokenKind::TabRef => process_tabref(node, qb),
        TokenKind::SubQuery => process_subquery(node, qb),
        TokenKind::Join | TokenKind::LeftOuterJoin | TokenKind::RightOuterJoin | TokenKind::FullOuterJoin => {
            let tree = build_join_tree(node, qb)?;
            qb.join_tree = Some(tree);
            Ok(())
        }
        other => Err(SemanticError::new(
            SemanticErrorKind::Generic,
            format!("unsupported FROM source {other:?}"),
        )
        .at(node.pos)),
    }
}

fn process_tabref(node: &AstNode, qb: &mut Qb) -> Result<()> {
    let table_name = node.text.clone();
    let alias = node
        .first_child_of_kind(TokenKind::Identifier)
        .map(|c| c.text.clone())
        .unwrap_or_else(|| table_name.clone());

    if qb.is_alias_known(&alias) {
        return Err(SemanticError::new(
            SemanticErrorKind::InvalidTableAlias,
            format!("duplicate table alias `{alias}`"),
        )
        .at(node.pos));
    }
    qb.tab_aliases.insert(alias.clone());
    qb.tab_name_for_alias.insert(alias.clone(), table_name);

    if let Some(ts) = node.first_child_of_kind(TokenKind::TableSample) {
        if ts.children.len() > 2 {
            return Err(SemanticError::new(
                SemanticErrorKind::SampleRestriction,
                "TABLESAMPLE supports at most two ON columns",
            )
            .at(ts.pos));
        }
        let (bucket_num, total_buckets) = parse_sample_spec(ts)?;
        qb.alias_to_sample.insert(
            alias,
            SampleSpec {
                bucket_num,
                total_buckets,
                on_columns: ts.children.clone(),
            },
        );
    }
    Ok(())
}

fn parse_sample_spec(ts: &AstNode) -> Result<(u32, u32)> {
    let mut parts = ts.text.splitn(2, '/');
    let bucket_num: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "malformed TABLESAMPLE spec").at(ts.pos))?;
    let total_buckets: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::Generic, "malformed TABLESAMPLE spec").at(ts.pos))?;
    Ok((bucket_num, total_buckets))
}

fn process_subquery(node: &AstNode, qb: &mut Qb) -> Result<()> {
    let alias = node
        .children
        .last()
        .filter(|c| c.kind == TokenKind::Identifier)
        .map(|c| c.text.clone())
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::NoSubqueryAlias, "subquery requires an alias").at(node.pos))?;

    if qb.is_alias_known(&alias) {
        return Err(SemanticError::new(
            SemanticErrorKind::InvalidTableAlias,
            format!("duplicate subquery alias `{alias}`"),
        )
        .at(node.pos));
    }

    let query_node = node.child(0).ok_or_else(|| missing_child(node, "nested query"))?;
    let expr = analyze_qb_expr(query_node, true)?;
    qb.subq_aliases.insert(alias.clone());
    qb.subq_for_alias.insert(alias, expr);
    Ok(())
}

enum JoinSide {
    Leaf(String),
    Nested(JoinTreeNode),
}

impl JoinSide {
    fn all_aliases(&self) -> Vec<String> {
        match self {
            JoinSide::Leaf(a) => vec![a.clone()],
            JoinSide::Nested(t) => t.all_aliases(),
        }
    }
}

fn process_join_side(node: &AstNode, qb: &mut Qb) -> Result<JoinSide> {
    match node.kind {
        TokenKind::TabRef => {
            process_tabref(node, qb)?;
            let alias = node
                .first_child_of_kind(TokenKind::Identifier)
                .map(|c| c.text.clone())
                .unwrap_or_else(|| node.text.clone());
            Ok(JoinSide::Leaf(alias))
        }
        TokenKind::SubQuery => {
            process_subquery(node, qb)?;
            let alias = node.children.last().expect("validated by process_subquery").text.clone();
            Ok(JoinSide::Leaf(alias))
        }
        TokenKind::Join | TokenKind::LeftOuterJoin | TokenKind::RightOuterJoin | TokenKind::FullOuterJoin => {
            Ok(JoinSide::Nested(build_join_tree(node, qb)?))
        }
        other => Err(SemanticError::new(
            SemanticErrorKind::Generic,
            format!("unsupported join operand {other:?}"),
        )
        .at(node.pos)),
    }
}

fn join_type_of(kind: TokenKind) -> JoinType {
    match kind {
        TokenKind::LeftOuterJoin => JoinType::LeftOuter,
        TokenKind::RightOuterJoin => JoinType::RightOuter,
        TokenKind::FullOuterJoin => JoinType::FullOuter,
        _ => JoinType::Inner,
    }
}

fn build_join_tree(node: &AstNode, qb: &mut Qb) -> Result<JoinTreeNode> {
    let join_type = join_type_of(node.kind);
    let left_node = node.child(0).ok_or_else(|| missing_child(node, "left join operand"))?;
    let right_node = node.child(1).ok_or_else(|| missing_child(node, "right join operand"))?;

    let left_side = process_join_side(left_node, qb)?;
    let right_side = process_join_side(right_node, qb)?;
    let right_alias = match right_side {
        JoinSide::Leaf(a) => a,
        JoinSide::Nested(_) => {
            return Err(SemanticError::new(
                SemanticErrorKind::Generic,
                "the right side of a join must be a base table or subquery",
            )
            .at(right_node.pos))
        }
    };

    let left_aliases = left_side.all_aliases();
    let cond = node
        .first_child_of_kind(TokenKind::JoinCond)
        .ok_or_else(|| SemanticError::new(SemanticErrorKind::InvalidJoinCondition2, "join has no ON condition").at(node.pos))?;

    let (equalities, filters_left, filters_right) = classify_join_cond(cond, &left_aliases, &right_alias)?;
    if equalities.is_empty() {
        return Err(SemanticError::new(
            SemanticErrorKind::InvalidJoinCondition2,
            "join condition has no equality referencing both sides",
        )
        .at(cond.pos));
    }
    let left_alias_ref = equalities[0].0.clone();
    if equalities.iter().any(|e| e.0 != left_alias_ref) {
        return Err(SemanticError::new(
            SemanticErrorKind::InvalidJoinCondition1,
            "composite join keys spanning multiple left aliases are not supported",
        )
        .at(cond.pos));
    }
    let left_exprs: Vec<AstNode> = equalities.iter().map(|e| e.1.clone()).collect();
    let right_exprs: Vec<AstNode> = equalities.iter().map(|e| e.2.clone()).collect();

    match left_side {
        JoinSide::Leaf(leaf_alias) => {
            let mut jt = JoinTreeNode::new(join_type);
            jt.left_alias = Some(leaf_alias.clone());
            jt.left_aliases = vec![leaf_alias.clone()];
            jt.right_aliases = vec![right_alias.clone()];
            jt.base_src = vec![Some(leaf_alias), Some(right_alias)];
            jt.expressions = vec![left_exprs, right_exprs];
            jt.filters = vec![filters_left, filters_right];
            jt.no_outer_join = !join_type.is_outer();
            crate::join::assign_tags(&mut jt);
            Ok(jt)
        }
        JoinSide::Nested(mut left_subtree) => {
            let candidate = JoinTreeNode {
                join_type,
                left_alias: Some(left_alias_ref.clone()),
                left_aliases: left_subtree.all_aliases(),
                right_aliases: vec![right_alias.clone()],
                base_src: vec![None, Some(right_alias.clone())],
                join_src: None,
                expressions: vec![left_exprs.clone(), right_exprs.clone()],
                filters: vec![filters_left.clone(), filters_right.clone()],
                no_outer_join: !join_type.is_outer(),
                next_tag: 0,
            };
            if crate::join::try_merge(&mut left_subtree, candidate) {
                crate::join::assign_tags(&mut left_subtree);
                Ok(left_subtree)
            } else {
                let mut jt = JoinTreeNode::new(join_type);
                jt.left_alias = Some(left_alias_ref);
                jt.left_aliases = left_subtree.all_aliases();
                jt.right_aliases = vec![right_alias.clone()];
                jt.base_src = vec![None, Some(right_alias)];
                jt.join_src = Some(Box::new(left_subtree));
                jt.expressions = vec![left_exprs, right_exprs];
                jt.filters = vec![filters_left, filters_right];
                jt.no_outer_join = !join_type.is_outer();
                crate::join::assign_tags(&mut jt);
                Ok(jt)
            }
        }
    }
}

type Equality = (String, AstNode, AstNode);

fn classify_join_cond(
    cond: &AstNode,
    left_aliases: &[String],
    right_alias: &str,
) -> Result<(Vec<Equality>, Vec<AstNode>, Vec<AstNode>)> {
    let pred = cond.child(0).ok_or_else(|| missing_child(cond, "join predicate"))?;
    if pred.kind == TokenKind::Or {
        return Err(SemanticError::new(
            SemanticErrorKind::InvalidJoinCondition3,
            "OR at the top of a join condition is not supported",
        )
        .at(pred.pos));
    }

    let mut conjuncts = Vec::new();
    flatten_and(pred, &mut conjuncts);

    let mut equalities = Vec::new();
    let mut filters_left = Vec::new();
    let mut filters_right = Vec::new();

    for conjunct in conjuncts {
        if conjunct.kind == TokenKind::Or {
            return Err(SemanticError::new(
                SemanticErrorKind::InvalidJoinCondition3,
                "OR is not supported inside a join condition",
            )
            .at(conjunct.pos));
        }
        let mut refs = Vec::new();
        referenced_aliases(&conjunct, &mut refs);
        if refs.iter().any(|r| r.is_none()) {
            return Err(SemanticError::new(
                SemanticErrorKind::AmbiguousTableAlias,
                "column references in a join condition must be alias-qualified",
            )
            .at(conjunct.pos));
        }
        let refs: Vec<String> = refs.into_iter().flatten().collect();
        let touches_left = refs.iter().any(|a| left_aliases.contains(a));
        let touches_right = refs.iter().any(|a| a == right_alias);

        match (touches_left, touches_right) {
            (true, true) => {
                if conjunct.kind != TokenKind::Equal {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidJoinCondition1,
                        "non-equality predicates spanning both sides of a join are not supported",
                    )
                    .at(conjunct.pos));
                }
                let lhs = conjunct.child(0).ok_or_else(|| missing_child(&conjunct, "equality left operand"))?;
                let rhs = conjunct.child(1).ok_or_else(|| missing_child(&conjunct, "equality right operand"))?;
                let mut lhs_refs = Vec::new();
                referenced_aliases(lhs, &mut lhs_refs);
                let lhs_is_left = lhs_refs.iter().flatten().any(|a| left_aliases.contains(a));
                let (left_alias_for_key, left_expr, right_expr) = if lhs_is_left {
                    let alias = lhs_refs.into_iter().flatten().next().unwrap();
                    (alias, lhs.clone(), rhs.clone())
                } else {
                    let mut rhs_refs = Vec::new();
                    referenced_aliases(rhs, &mut rhs_refs);
                    let alias = rhs_refs.into_iter().flatten().next().unwrap();
                    (alias, rhs.clone(), lhs.clone())
                };
                equalities.push((left_alias_for_key, left_expr, right_expr));
            }
            (true, false) => filters_left.push(conjunct),
            (false, true) => filters_right.push(conjunct),
            (false, false) => {
                return Err(SemanticError::new(
                    SemanticErrorKind::InvalidJoinCondition2,
                    "join predicate references neither side of the join",
                )
                .at(conjunct.pos))
            }
        }
    }

    Ok((equalities, filters_left, filters_right))
}

fn flatten_and(node: &AstNode, out: &mut Vec<AstNode>) {
    if node.kind == TokenKind::And && node.children.len() == 2 {
        flatten_and(&node.children[0], out);
        flatten_and(&node.children[1], out);
    } else {
        out.push(node.clone());
    }
}

fn referenced_aliases(node: &AstNode, out: &mut Vec<Option<String>>) {
    if node.kind == TokenKind::ColRef {
        out.push(node.first_child_of_kind(TokenKind::Identifier).map(|c| c.text.clone()));
        return;
    }
    for c in &node.children {
        referenced_aliases(c, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{leaf, node};

    fn colref(alias: &str, col: &str) -> AstNode {
        leaf(TokenKind::ColRef, col).with_children(vec![leaf(TokenKind::Identifier, alias)])
    }

    fn tabref(name: &str, alias: &str) -> AstNode {
        leaf(TokenKind::TabRef, name).with_children(vec![leaf(TokenKind::Identifier, alias)])
    }

    #[test]
    fn simple_select_creates_one_implicit_destination() {
        let select = node(TokenKind::Select, vec![colref("t", "key")]);
        let from = node(TokenKind::From, vec![tabref("t", "t")]);
        let query = node(TokenKind::Query, vec![from, select]);

        let expr = analyze(&query).unwrap();
        let QbExpr::Single(qb) = expr else { panic!("expected single QB") };
        assert_eq!(qb.destination_names(), vec!["insclause-0".to_string()]);
        assert!(qb.tab_aliases.contains("t"));
    }

    #[test]
    fn select_distinct_with_group_by_is_rejected() {
        let select = AstNode::new(TokenKind::SelectDistinct, "").with_children(vec![colref("t", "a")]);
        let group_by = node(TokenKind::GroupBy, vec![colref("t", "a")]);
        let from = node(TokenKind::From, vec![tabref("t", "t")]);
        let query = node(TokenKind::Query, vec![from, select, group_by]);

        let err = analyze(&query).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::SelectDistinctWithGroupBy);
    }

    #[test]
    fn cluster_by_with_sort_by_conflicts() {
        let select = node(TokenKind::Select, vec![colref("t", "a")]);
        let from = node(TokenKind::From, vec![tabref("t", "t")]);
        let cluster_by = node(TokenKind::ClusterBy, vec![colref("t", "a")]);
        let sort_by = node(TokenKind::SortBy, vec![colref("t", "a")]);
        let query = node(TokenKind::Query, vec![from, select, cluster_by, sort_by]);

        let err = analyze(&query).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::ClusterBySortByConflict);
    }

    #[test]
    fn duplicate_table_alias_is_rejected() {
        let join_cond = node(
            TokenKind::JoinCond,
            vec![AstNode::new(TokenKind::Equal, "").with_children(vec![colref("a", "k"), colref("a", "k")])],
        );
        let join = AstNode::new(TokenKind::Join, "")
            .with_children(vec![tabref("a", "a"), tabref("b", "a"), join_cond]);
        let select = node(TokenKind::Select, vec![colref("a", "k")]);
        let from = node(TokenKind::From, vec![join]);
        let query = node(TokenKind::Query, vec![from, select]);

        let err = analyze(&query).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidTableAlias);
    }

    #[test]
    fn three_way_join_merges_on_shared_left_key() {
        let cond_ab = node(
            TokenKind::JoinCond,
            vec![AstNode::new(TokenKind::Equal, "").with_children(vec![colref("a", "k"), colref("b", "k")])],
        );
        let ab = AstNode::new(TokenKind::Join, "").with_children(vec![tabref("a", "a"), tabref("b", "b"), cond_ab]);

        let cond_ac = node(
            TokenKind::JoinCond,
            vec![AstNode::new(TokenKind::Equal, "").with_children(vec![colref("a", "k"), colref("c", "k")])],
        );
        let abc = AstNode::new(TokenKind::Join, "").with_children(vec![ab, tabref("c", "c"), cond_ac]);

        let select = node(TokenKind::Select, vec![colref("a", "x")]);
        let from = node(TokenKind::From, vec![abc]);
        let query = node(TokenKind::Query, vec![from, select]);

        let expr = analyze(&query).unwrap();
        let QbExpr::Single(qb) = expr else { panic!("expected single QB") };
        let tree = qb.join_tree.expect("join tree present");
        assert_eq!(tree.num_sides(), 3);
        assert_eq!(tree.all_aliases(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn or_at_top_of_join_condition_is_rejected() {
        let cond = node(
            TokenKind::JoinCond,
            vec![AstNode::new(TokenKind::Or, "").with_children(vec![
                AstNode::new(TokenKind::Equal, "").with_children(vec![colref("a", "k"), colref("b", "k")]),
                AstNode::new(TokenKind::Equal, "").with_children(vec![colref("a", "j"), colref("b", "j")]),
            ])],
        );
        let join = AstNode::new(TokenKind::Join, "").with_children(vec![tabref("a", "a"), tabref("b", "b"), cond]);
        let select = node(TokenKind::Select, vec![colref("a", "x")]);
        let from = node(TokenKind::From, vec![join]);
        let query = node(TokenKind::Query, vec![from, select]);

        let err = analyze(&query).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidJoinCondition3);
    }

    #[test]
    fn subquery_without_alias_is_rejected() {
        let inner_select = node(TokenKind::Select, vec![colref("t", "key")]);
        let inner_from = node(TokenKind::From, vec![tabref("t", "t")]);
        let inner_query = node(TokenKind::Query, vec![inner_from, inner_select]);
        let subquery = node(TokenKind::SubQuery, vec![inner_query]);

        let outer_select = node(TokenKind::Select, vec![colref("s", "key")]);
        let outer_from = node(TokenKind::From, vec![subquery]);
        let outer_query = node(TokenKind::Query, vec![outer_from, outer_select]);

        let err = analyze(&outer_query).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::NoSubqueryAlias);
    }
}
