//! Join planner (spec.md §4.6).
//!
//! Builds the binary join tree's operator-level realization: per-side
//! filter pushdown, `ReduceSink` shuffle per input, join-key type
//! unification across sides, and the multi-way merge rule for binary joins
//! sharing a left key. Grounded on the teacher's `sql::srq::anchor`
//! pipeline-merge pass, which likewise folds a chain of compatible stages
//! into one before emitting SQL.

use crate::ast::AstNode;
use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::expr::Expr;
use crate::ir::operator::{OpGraph, OpId, OpKind, ReduceSinkKey};
use crate::ir::qb::{JoinTreeNode, SortDirection};
use crate::metastore::FunctionRegistry;

/// Attempts to fold `candidate` into `ancestor` per spec.md §4.6: a node
/// can merge into an ancestor when its `leftAlias` matches one of the
/// ancestor's aliases and its first-side key expressions are structurally
/// equal (by canonical text) to the ancestor's key expressions at that
/// position.
pub fn try_merge(ancestor: &mut JoinTreeNode, candidate: JoinTreeNode) -> bool {
    let aliases = ancestor.all_aliases();
    let Some(pos) = candidate
        .left_alias
        .as_ref()
        .and_then(|a| aliases.iter().position(|x| x == a))
    else {
        return false;
    };

    let ancestor_keys: Vec<String> = ancestor.expressions[pos].iter().map(AstNode::canonical_text).collect();
    let candidate_keys: Vec<String> = candidate.expressions[0].iter().map(AstNode::canonical_text).collect();
    if ancestor_keys != candidate_keys {
        return false;
    }

    ancestor.right_aliases.extend(candidate.right_aliases);
    ancestor.base_src.push(candidate.base_src[1].clone());
    ancestor.expressions.push(candidate.expressions[1].clone());
    ancestor.filters.push(candidate.filters[1].clone());
    ancestor.no_outer_join = ancestor.no_outer_join && candidate.no_outer_join;
    true
}

/// Repeatedly merges every node in `candidates` into `root` where possible,
/// spec.md §4.6 "Merge binary joins that share a left key into a single
/// multi-way `Join` operator". Nodes that cannot yet merge (their shared
/// alias isn't in `root` yet) are retried until a pass makes no progress.
pub fn merge_all(mut root: JoinTreeNode, candidates: Vec<JoinTreeNode>) -> JoinTreeNode {
    let mut pending = candidates;
    loop {
        let mut progressed = false;
        let mut remaining = Vec::new();
        for candidate in pending {
            let retry = candidate.clone();
            if try_merge(&mut root, candidate) {
                progressed = true;
            } else {
                remaining.push(retry);
            }
        }
        pending = remaining;
        if !progressed || pending.is_empty() {
            break;
        }
    }
    root
}

/// Assigns a stable tag to each input position, spec.md §3 "nextTag".
pub fn assign_tags(node: &mut JoinTreeNode) {
    node.next_tag = node.num_sides() as u32;
}

/// Unifies the k-th join key's type across every side using the function
/// registry's common-class rule, wrapping non-conforming sides in a
/// conversion function descriptor (spec.md §4.6).
pub fn unify_key_types(key_exprs: &mut [Vec<Expr>], functions: &dyn FunctionRegistry) -> Result<()> {
    if key_exprs.is_empty() {
        return Ok(());
    }
    let num_keys = key_exprs[0].len();
    for side in key_exprs.iter() {
        if side.len() != num_keys {
            return Err(SemanticError::new(
                SemanticErrorKind::InvalidJoinCondition2,
                "join sides disagree on the number of equality keys",
            ));
        }
    }

    for k in 0..num_keys {
        let mut common = key_exprs[0][k].ty.clone();
        for side in key_exprs.iter().skip(1) {
            common = functions
                .common_class(&common, &side[k].ty)
                .ok_or_else(|| SemanticError::new(SemanticErrorKind::InvalidOperatorSignature, "join keys have no common type"))?;
        }
        for side in key_exprs.iter_mut() {
            if side[k].ty != common {
                let target_name = common.as_primitive().map(|p| p.type_name()).unwrap_or("");
                if let Some(udf) = functions.conversion_udf(target_name, &side[k].ty) {
                    side[k] = Expr::func(udf, "evaluate", vec![side[k].clone()], false, common.clone());
                }
            }
        }
    }
    Ok(())
}

fn and_fold(mut exprs: Vec<Expr>) -> Option<Expr> {
    let first = exprs.pop()?;
    Some(exprs.into_iter().fold(first, |acc, e| {
        let ty = acc.ty.clone();
        Expr::func("and", "evaluate", vec![acc, e], false, ty)
    }))
}

/// Wires one `ReduceSink` per input side (with filter pushdown applied
/// first) and a final multi-way `Join` operator over them, spec.md §4.6:
/// each side's sort key is its join-key expressions and its value is the
/// side's full input row, so the join operator downstream sees every
/// column from every side, not just the keys it joined on.
pub fn plan_join(
    graph: &mut OpGraph,
    inputs: &[OpId],
    key_exprs: &[Vec<Expr>],
    value_exprs: &[Vec<Expr>],
    filter_exprs: &[Vec<Expr>],
    outer_sides: &[bool],
) -> OpId {
    let mut rs_ids = Vec::with_capacity(inputs.len());
    for (i, &input) in inputs.iter().enumerate() {
        let mut side_input = input;
        if let Some(pred) = and_fold(filter_exprs.get(i).cloned().unwrap_or_default()) {
            let filter = graph.add(OpKind::Filter {
                predicate: pred,
                is_sampling_pred: false,
            });
            graph.link(side_input, filter);
            side_input = filter;
        }

        let keys = key_exprs.get(i).cloned().unwrap_or_default();
        let values = value_exprs.get(i).cloned().unwrap_or_default();
        let rs = graph.add(OpKind::ReduceSink {
            keys: keys
                .iter()
                .map(|e| ReduceSinkKey {
                    expr: e.clone(),
                    order: SortDirection::Asc,
                })
                .collect(),
            values,
            partition_keys: keys,
            tag: i as i32,
            num_reducers: -1,
        });
        graph.link(side_input, rs);
        rs_ids.push(rs);
    }

    let join = graph.add(OpKind::Join {
        key_exprs: key_exprs.to_vec(),
        filters: vec![Vec::new(); inputs.len()],
        outer_sides: outer_sides.to_vec(),
    });
    for rs in rs_ids {
        graph.link(rs, join);
    }
    join
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TokenKind;
    use crate::ir::qb::JoinType;
    use crate::ir::types::{PrimitiveType, TypeInfo};
    use crate::metastore::BuiltinRegistry;

    fn eq_key(alias: &str, col: &str) -> AstNode {
        AstNode::new(TokenKind::ColRef, col).with_children(vec![AstNode::new(TokenKind::Identifier, alias)])
    }

    #[test]
    fn merges_when_left_alias_and_keys_match() {
        let mut a_b = JoinTreeNode::new(JoinType::Inner);
        a_b.left_aliases = vec!["a".to_string()];
        a_b.right_aliases = vec!["b".to_string()];
        a_b.base_src = vec![Some("a".to_string()), Some("b".to_string())];
        a_b.expressions = vec![vec![eq_key("a", "k")], vec![eq_key("b", "k")]];

        let mut a_c = JoinTreeNode::new(JoinType::Inner);
        a_c.left_alias = Some("a".to_string());
        a_c.left_aliases = vec!["a".to_string()];
        a_c.right_aliases = vec!["c".to_string()];
        a_c.base_src = vec![Some("a".to_string()), Some("c".to_string())];
        a_c.expressions = vec![vec![eq_key("a", "k")], vec![eq_key("c", "k")]];

        assert!(try_merge(&mut a_b, a_c));
        assert_eq!(a_b.all_aliases(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(a_b.num_sides(), 3);
    }

    #[test]
    fn does_not_merge_on_mismatched_keys() {
        let mut a_b = JoinTreeNode::new(JoinType::Inner);
        a_b.left_aliases = vec!["a".to_string()];
        a_b.right_aliases = vec!["b".to_string()];
        a_b.base_src = vec![Some("a".to_string()), Some("b".to_string())];
        a_b.expressions = vec![vec![eq_key("a", "k")], vec![eq_key("b", "k")]];

        let mut a_c = JoinTreeNode::new(JoinType::Inner);
        a_c.left_alias = Some("a".to_string());
        a_c.expressions = vec![vec![eq_key("a", "other")], vec![eq_key("c", "k")]];
        a_c.base_src = vec![Some("a".to_string()), Some("c".to_string())];

        assert!(!try_merge(&mut a_b, a_c));
    }

    #[test]
    fn unify_key_types_widens_to_common_class() {
        let functions = BuiltinRegistry;
        let mut keys = vec![
            vec![Expr::column("0", TypeInfo::Primitive(PrimitiveType::Integer))],
            vec![Expr::column("1", TypeInfo::Primitive(PrimitiveType::Long))],
        ];
        unify_key_types(&mut keys, &functions).unwrap();
        assert_eq!(keys[0][0].ty, TypeInfo::Primitive(PrimitiveType::Long));
    }

    #[test]
    fn plan_join_wires_one_reduce_sink_per_side_and_a_join() {
        let mut g = OpGraph::new();
        let a = g.add(OpKind::TableScan {
            alias: "a".into(),
            table: dummy_table(),
            needed_columns: vec![],
        });
        let b = g.add(OpKind::TableScan {
            alias: "b".into(),
            table: dummy_table(),
            needed_columns: vec![],
        });
        let key = vec![Expr::column("0", TypeInfo::Primitive(PrimitiveType::Integer))];
        let values = vec![Expr::column("0", TypeInfo::Primitive(PrimitiveType::Integer))];
        let join = plan_join(
            &mut g,
            &[a, b],
            &[key.clone(), key],
            &[values.clone(), values],
            &[vec![], vec![]],
            &[false, false],
        );
        assert!(matches!(g.get(join).kind, OpKind::Join { .. }));
        assert_eq!(g.get(join).parents.len(), 2);
        for &rs in &g.get(join).parents {
            match &g.get(rs).kind {
                OpKind::ReduceSink { values, .. } => assert_eq!(values.len(), 1, "each side's row must be carried as the reduce-sink's value"),
                other => panic!("expected ReduceSink, got {other:?}"),
            }
        }
    }

    fn dummy_table() -> crate::metastore::Table {
        crate::metastore::Table {
            name: "t".to_string(),
            schema: vec![],
            partition_cols: vec![],
            bucket_cols: vec![],
            num_buckets: None,
            input_format: crate::metastore::FileFormat::Text,
            output_format: crate::metastore::FileFormat::Text,
            location: "/t".to_string(),
        }
    }
}
