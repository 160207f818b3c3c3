//! External collaborator contracts (spec.md §6): the metastore and the
//! function registry. Both are pull-only traits so the analyzer can be
//! driven by an in-memory fixture in tests (SPEC_FULL.md §14) and by a real
//! catalog in a host process, the same way the teacher keeps parsing,
//! resolution and codegen decoupled from any concrete I/O.

use crate::error::{SemanticError, SemanticErrorKind};
use crate::ir::expr::Constant;
use crate::ir::types::{PrimitiveType, TypeInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    SequenceFile,
    Orc,
    Parquet,
    RcFile,
    /// A format-class name the metastore returned that this core doesn't
    /// recognize; carried through so binding can reject it with the
    /// storage-format class name in the error instead of panicking on an
    /// unmapped variant.
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub schema: Vec<ColumnSchema>,
    pub partition_cols: Vec<ColumnSchema>,
    pub bucket_cols: Vec<String>,
    pub num_buckets: Option<u32>,
    pub input_format: FileFormat,
    pub output_format: FileFormat,
    pub location: String,
}

impl Table {
    pub fn is_partitioned(&self) -> bool {
        !self.partition_cols.is_empty()
    }

    pub fn is_bucketed(&self) -> bool {
        self.num_buckets.is_some() && !self.bucket_cols.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.schema
            .iter()
            .chain(self.partition_cols.iter())
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_partition_column(&self, name: &str) -> bool {
        self.partition_cols
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Partition-column values, in the same order as `Table::partition_cols`.
    pub values: Vec<Constant>,
    pub location: String,
}

/// Pull-only metastore collaborator (spec.md §6).
pub trait Metastore {
    fn get_table(&self, name: &str) -> Result<Table, SemanticError>;
    fn list_partitions(&self, table: &Table) -> Result<Vec<Partition>, SemanticError>;

    /// Allocates a scratch directory path for a destination write, per
    /// spec.md §6 destination layout: `<scratchDir>/<sessionId>.<counter>.<destName>`.
    fn scratch_path(&self, session_id: &str, counter: u64, dest_name: &str) -> String {
        format!("{session_id}.{counter}.{dest_name}")
    }
}

pub fn invalid_table(name: &str) -> SemanticError {
    SemanticError::new(
        SemanticErrorKind::InvalidTable,
        format!("table or view `{name}` does not exist"),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub udf_class: String,
    pub arg_types: Vec<TypeInfo>,
    pub return_type: TypeInfo,
}

/// One aggregate evaluator's bound method names for a given mode, spec.md
/// §4.5. `Complete` is simply `(iterate, terminate)` and is looked up the
/// same way as any other mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    Hash,
    Partial1,
    Partial2,
    Final,
    Complete,
}

impl AggregateMode {
    pub fn methods(self, _is_distinct: bool) -> (&'static str, &'static str) {
        use AggregateMode::*;
        match self {
            Hash | Partial1 => ("iterate", "terminatePartial"),
            Partial2 => ("merge", "terminatePartial"),
            Final => ("merge", "terminate"),
            Complete => ("iterate", "terminate"),
        }
    }

    /// A `DISTINCT` aggregator always uses `iterate` regardless of mode,
    /// except in `Final` where it becomes a non-distinct merge (spec.md §4.5).
    pub fn evaluate_method(self, is_distinct: bool) -> &'static str {
        if is_distinct && self != AggregateMode::Final {
            "iterate"
        } else {
            self.methods(is_distinct).0
        }
    }

    pub fn terminate_method(self) -> &'static str {
        self.methods(false).1
    }
}

/// Pull-only function/UDAF registry collaborator (spec.md §6).
pub trait FunctionRegistry {
    fn get_udf(&self, name: &str, arg_types: &[TypeInfo]) -> Option<FunctionSignature>;
    fn get_udaf(&self, name: &str, arg_types: &[TypeInfo]) -> Option<FunctionSignature>;

    /// Least upper-bound type two values must be converted to before being
    /// compared/combined, e.g. for join-key unification (spec.md §4.6) and
    /// numeric widening (spec.md §4.4).
    fn common_class(&self, a: &TypeInfo, b: &TypeInfo) -> Option<TypeInfo>;

    fn implicit_convertible(&self, from: &TypeInfo, to: &TypeInfo) -> bool;

    /// Name of the conversion UDF from `from` into `target_type_name`, used
    /// to wrap a non-conforming expression during coercion.
    fn conversion_udf(&self, target_type_name: &str, from: &TypeInfo) -> Option<String>;
}

/// A small, deterministic built-in registry covering the primitives named
/// in spec.md §4.4 (numeric widening, string<->numeric conversion). Real
/// catalogs plug in their own UDF/UDAF tables via the trait above; this is
/// provided so the planner's pure logic can be exercised without a mock in
/// every single test.
#[derive(Debug, Default)]
pub struct BuiltinRegistry;

impl FunctionRegistry for BuiltinRegistry {
    fn get_udf(&self, name: &str, arg_types: &[TypeInfo]) -> Option<FunctionSignature> {
        let ret = match name {
            "concat" => TypeInfo::Primitive(PrimitiveType::String),
            "+" | "-" | "*" | "/" => {
                let mut best = PrimitiveType::Integer;
                for t in arg_types {
                    if let Some(p) = t.as_primitive() {
                        if p.is_numeric() && p.numeric_rank() > best.numeric_rank() {
                            best = p;
                        }
                    }
                }
                TypeInfo::Primitive(best)
            }
            "cast_to_string" => TypeInfo::Primitive(PrimitiveType::String),
            "cast_to_double" => TypeInfo::Primitive(PrimitiveType::Double),
            _ => return None,
        };
        Some(FunctionSignature {
            udf_class: name.to_string(),
            arg_types: arg_types.to_vec(),
            return_type: ret,
        })
    }

    fn get_udaf(&self, name: &str, arg_types: &[TypeInfo]) -> Option<FunctionSignature> {
        let ret = match name {
            "count" => TypeInfo::Primitive(PrimitiveType::Long),
            "sum" => arg_types.first().cloned().unwrap_or(TypeInfo::Primitive(PrimitiveType::Double)),
            "min" | "max" => arg_types.first().cloned()?,
            "avg" => TypeInfo::Primitive(PrimitiveType::Double),
            _ => return None,
        };
        Some(FunctionSignature {
            udf_class: name.to_string(),
            arg_types: arg_types.to_vec(),
            return_type: ret,
        })
    }

    fn common_class(&self, a: &TypeInfo, b: &TypeInfo) -> Option<TypeInfo> {
        match (a.as_primitive(), b.as_primitive()) {
            (Some(pa), Some(pb)) if pa == pb => Some(a.clone()),
            (Some(pa), Some(pb)) if pa.is_numeric() && pb.is_numeric() => {
                if pa.numeric_rank() >= pb.numeric_rank() {
                    Some(a.clone())
                } else {
                    Some(b.clone())
                }
            }
            _ if a == b => Some(a.clone()),
            _ => None,
        }
    }

    fn implicit_convertible(&self, from: &TypeInfo, to: &TypeInfo) -> bool {
        match (from.as_primitive(), to.as_primitive()) {
            (Some(f), Some(t)) if f.is_numeric() && t.is_numeric() => f.numeric_rank() <= t.numeric_rank(),
            (Some(PrimitiveType::String), Some(t)) if t.is_numeric() => true,
            (Some(f), Some(PrimitiveType::String)) if f.is_numeric() => true,
            _ => from == to,
        }
    }

    fn conversion_udf(&self, target_type_name: &str, _from: &TypeInfo) -> Option<String> {
        match target_type_name {
            "string" => Some("cast_to_string".to_string()),
            "double" => Some("cast_to_double".to_string()),
            _ => None,
        }
    }
}
