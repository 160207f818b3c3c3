//! Partition pruner and sample pruner (spec.md §4.7, §4.8).
//!
//! Grounded on the teacher's constant-folding pass in `semantic/rq`, which
//! evaluates literal-only subexpressions without touching a real row: the
//! partition pruner here does the same restricted evaluation, only over
//! partition-column values rather than arbitrary constants.

use std::collections::BTreeMap;

use crate::config::PruningMode;
use crate::error::{SemanticError, SemanticErrorKind};
use crate::ir::expr::{Constant, Expr, ExprKind};
use crate::metastore::{Partition, Table};

#[derive(Debug, Clone, Default)]
pub struct PruneResult {
    pub confirmed: Vec<Partition>,
    pub unknown: Vec<Partition>,
}

/// Per-alias accumulator of predicates touching (or not) a partitioned
/// table, spec.md §3 "Partition pruner".
#[derive(Debug, Clone)]
pub struct PartitionPruner {
    pub table: Table,
    /// `(predicate, is_join)` — join-embedded predicates are tracked
    /// separately so a join-confirmed alias can skip where-only pruning
    /// (spec.md §4.7).
    preds: Vec<(Expr, bool)>,
}

impl PartitionPruner {
    pub fn new(table: Table) -> Self {
        PartitionPruner {
            table,
            preds: Vec::new(),
        }
    }

    pub fn add_where_pred(&mut self, expr: Expr) {
        self.preds.push((expr, false));
    }

    pub fn add_join_pred(&mut self, expr: Expr) {
        self.preds.push((expr, true));
    }

    pub fn is_join_pruned(&self) -> bool {
        self.preds
            .iter()
            .any(|(e, is_join)| *is_join && has_partition_predicate(e, &self.table))
    }

    /// A predicate qualifies iff every column it references is a partition
    /// column (spec.md §4.7).
    pub fn has_any_partition_predicate(&self) -> bool {
        self.preds.iter().any(|(e, _)| has_partition_predicate(e, &self.table))
    }

    /// Strict-mode precondition, spec.md §4.7/§7 `NoPartitionPredicate`.
    pub fn enforce_mode(&self, mode: PruningMode) -> Result<(), SemanticError> {
        if mode == PruningMode::Strict
            && self.table.is_partitioned()
            && !self.is_join_pruned()
            && !self.has_any_partition_predicate()
        {
            return Err(SemanticError::new(
                SemanticErrorKind::NoPartitionPredicate,
                format!(
                    "table `{}` is partitioned and strict pruning requires a partition predicate",
                    self.table.name
                ),
            ));
        }
        Ok(())
    }

    /// Enumerates `self.table`'s partitions against the accumulated
    /// where-predicates (join-pruned aliases skip where-only evaluation,
    /// spec.md §4.7), returning the confirmed/unknown split.
    pub fn prune(&self, partitions: &[Partition]) -> PruneResult {
        let where_preds: Vec<&Expr> = if self.is_join_pruned() {
            Vec::new()
        } else {
            self.preds.iter().filter(|(_, j)| !j).map(|(e, _)| e).collect()
        };

        let mut result = PruneResult::default();
        for p in partitions {
            let bindings = partition_bindings(&self.table, p);
            let mut confirmed = true;
            let mut decided = true;
            for pred in &where_preds {
                match eval_predicate(pred, &bindings) {
                    Some(true) => {}
                    Some(false) => {
                        confirmed = false;
                    }
                    None => {
                        decided = false;
                    }
                }
            }
            if !decided {
                result.unknown.push(p.clone());
            } else if confirmed {
                result.confirmed.push(p.clone());
            }
        }
        result
    }
}

fn partition_bindings(table: &Table, p: &Partition) -> BTreeMap<String, Constant> {
    table
        .partition_cols
        .iter()
        .zip(p.values.iter())
        .map(|(col, val)| (col.name.to_ascii_lowercase(), val.clone()))
        .collect()
}

/// spec.md §4.7: "A predicate `hasPartitionPredicate` iff every column
/// reference it contains is a partition column."
pub fn has_partition_predicate(expr: &Expr, table: &Table) -> bool {
    let mut cols = Vec::new();
    expr.referenced_columns(&mut cols);
    !cols.is_empty() && cols.iter().all(|c| table.is_partition_column(c))
}

/// Restricted constant-folding evaluator: only `Column`s bound in
/// `bindings`, constants, `=`/`!=` comparisons and `and`/`or` combinators
/// are understood. Anything else (a non-partition column, an unsupported
/// operator) yields `None`, the "unknown" case from spec.md §4.7.
fn eval_predicate(expr: &Expr, bindings: &BTreeMap<String, Constant>) -> Option<bool> {
    match &expr.kind {
        ExprKind::Func {
            udf_class, args, ..
        } if udf_class == "and" && args.len() == 2 => {
            match (eval_predicate(&args[0], bindings), eval_predicate(&args[1], bindings)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }
        }
        ExprKind::Func {
            udf_class, args, ..
        } if udf_class == "or" && args.len() == 2 => {
            match (eval_predicate(&args[0], bindings), eval_predicate(&args[1], bindings)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }
        }
        ExprKind::Func {
            udf_class, args, ..
        } if (udf_class == "=" || udf_class == "!=") && args.len() == 2 => {
            let lhs = eval_const(&args[0], bindings)?;
            let rhs = eval_const(&args[1], bindings)?;
            let eq = lhs == rhs;
            Some(if udf_class == "=" { eq } else { !eq })
        }
        _ => None,
    }
}

fn eval_const(expr: &Expr, bindings: &BTreeMap<String, Constant>) -> Option<Constant> {
    match &expr.kind {
        ExprKind::Constant(c) => Some(c.clone()),
        ExprKind::Column(name) => bindings.get(&name.to_ascii_lowercase()).cloned(),
        _ => None,
    }
}

/// Decision for a `TABLESAMPLE(BUCKET n OUT OF d [ON cols])` clause,
/// spec.md §4.8.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDecision {
    /// When `true`, input pruning alone suffices; `selected_buckets` names
    /// the table's own bucket indices (0-based) to read.
    pub input_pruning_suffices: bool,
    pub selected_buckets: Vec<u32>,
    /// Set when a row-level hash predicate must additionally be evaluated.
    pub predicate_columns: Vec<String>,
    pub bucket_num: u32,
    pub total_buckets: u32,
}

/// spec.md §4.8: input pruning alone suffices when the sample columns equal
/// the table's bucketing columns and `d` divides `numBuckets` (or `d` ==
/// `numBuckets`); otherwise a hash predicate is required over the
/// bucketing columns (if they match the sample) or the explicit `ON`
/// columns.
pub fn plan_sample(table: &Table, bucket_num: u32, total_buckets: u32, on_columns: &[String]) -> SampleDecision {
    let sample_matches_bucketing = on_columns.is_empty()
        || (on_columns.len() == table.bucket_cols.len()
            && on_columns
                .iter()
                .zip(table.bucket_cols.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b)));

    if let Some(num_buckets) = table.num_buckets {
        if sample_matches_bucketing && num_buckets % total_buckets == 0 {
            let stride = num_buckets / total_buckets;
            let selected = (0..stride).map(|i| (bucket_num - 1) + i * total_buckets).collect();
            return SampleDecision {
                input_pruning_suffices: true,
                selected_buckets: selected,
                predicate_columns: Vec::new(),
                bucket_num,
                total_buckets,
            };
        }
    }

    let predicate_columns = if sample_matches_bucketing {
        table.bucket_cols.clone()
    } else {
        on_columns.to_vec()
    };
    SampleDecision {
        input_pruning_suffices: false,
        selected_buckets: Vec::new(),
        predicate_columns,
        bucket_num,
        total_buckets,
    }
}

/// spec.md §8 sample predicate law: `π(r) ↔ (hash(cols(r)) & 0x7FFFFFFF) % d
/// == n - 1`. `hash_value` is the caller-computed `default_sample_hashfn`
/// result over the predicate columns of one row.
pub fn sample_predicate_holds(hash_value: i32, bucket_num: u32, total_buckets: u32) -> bool {
    ((hash_value & 0x7FFF_FFFF) as u32 % total_buckets) == bucket_num - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{PrimitiveType, TypeInfo};
    use crate::metastore::{ColumnSchema, FileFormat};

    fn table(partitioned: bool, num_buckets: Option<u32>, bucket_cols: Vec<&str>) -> Table {
        Table {
            name: "t".to_string(),
            schema: vec![ColumnSchema {
                name: "x".to_string(),
                ty: TypeInfo::Primitive(PrimitiveType::Integer),
            }],
            partition_cols: if partitioned {
                vec![ColumnSchema {
                    name: "dt".to_string(),
                    ty: TypeInfo::Primitive(PrimitiveType::String),
                }]
            } else {
                vec![]
            },
            bucket_cols: bucket_cols.into_iter().map(String::from).collect(),
            num_buckets,
            input_format: FileFormat::Text,
            output_format: FileFormat::Text,
            location: "/t".to_string(),
        }
    }

    #[test]
    fn strict_mode_rejects_missing_partition_predicate() {
        let pruner = PartitionPruner::new(table(true, None, vec![]));
        let err = pruner.enforce_mode(PruningMode::Strict).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::NoPartitionPredicate);
    }

    #[test]
    fn equality_predicate_confirms_matching_partition() {
        let mut pruner = PartitionPruner::new(table(true, None, vec![]));
        let pred = Expr::func(
            "=",
            "",
            vec![
                Expr::column("dt", TypeInfo::Primitive(PrimitiveType::String)),
                Expr::constant(Constant::String("2009-01-01".to_string()), PrimitiveType::String),
            ],
            false,
            TypeInfo::Primitive(PrimitiveType::Boolean),
        );
        pruner.add_where_pred(pred);
        pruner.enforce_mode(PruningMode::Strict).unwrap();

        let matching = Partition {
            values: vec![Constant::String("2009-01-01".to_string())],
            location: "/t/dt=2009-01-01".to_string(),
        };
        let other = Partition {
            values: vec![Constant::String("2009-01-02".to_string())],
            location: "/t/dt=2009-01-02".to_string(),
        };
        let result = pruner.prune(&[matching.clone(), other]);
        assert_eq!(result.confirmed, vec![matching]);
    }

    #[test]
    fn non_partition_column_predicate_is_unknown() {
        let mut pruner = PartitionPruner::new(table(true, None, vec![]));
        let pred = Expr::func(
            "=",
            "",
            vec![
                Expr::column("x", TypeInfo::Primitive(PrimitiveType::Integer)),
                Expr::constant(Constant::Integer(1), PrimitiveType::Integer),
            ],
            false,
            TypeInfo::Primitive(PrimitiveType::Boolean),
        );
        pruner.add_where_pred(pred);
        let p = Partition {
            values: vec![Constant::String("2009-01-01".to_string())],
            location: "/t/dt=2009-01-01".to_string(),
        };
        let result = pruner.prune(&[p.clone()]);
        assert_eq!(result.unknown, vec![p]);
        assert!(result.confirmed.is_empty());
    }

    #[test]
    fn sample_matching_bucketing_and_dividing_needs_no_predicate() {
        let t = table(false, Some(32), vec!["userid"]);
        let d = plan_sample(&t, 3, 32, &[]);
        assert!(d.input_pruning_suffices);
        assert_eq!(d.selected_buckets, vec![2]);
    }

    #[test]
    fn sample_with_non_dividing_bucket_count_needs_predicate() {
        let t = table(false, Some(16), vec!["userid"]);
        let d = plan_sample(&t, 3, 32, &[]);
        assert!(!d.input_pruning_suffices);
        assert_eq!(d.predicate_columns, vec!["userid".to_string()]);
    }

    #[test]
    fn sample_predicate_law_matches_formula() {
        for hash in [-5_i32, 0, 7, 123456, i32::MIN, i32::MAX] {
            let expected = ((hash & 0x7FFF_FFFF) as u32 % 32) == 2;
            assert_eq!(sample_predicate_holds(hash, 3, 32), expected);
        }
    }
}
