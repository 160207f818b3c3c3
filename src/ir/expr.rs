//! Typed expression descriptors (spec.md §3 "Typed expression descriptor",
//! §4.4 expression compiler output).
//!
//! Grounded on the teacher's `ir::rq::Expr`/`ExprKind`: a flat struct
//! carrying a `kind` sum type, decoded with `EnumAsInner` instead of manual
//! `match` boilerplate at call sites.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::ir::types::{PrimitiveType, TypeInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum ExprKind {
    Null,
    Constant(Constant),
    /// Reference to a column by internal name, resolved through a
    /// `RowResolver` (spec.md §4.3).
    Column(String),
    /// A resolved function/UDF(-aggregate) call: `udfClass` is the
    /// registry-resolved implementation identifier, `method` the bound
    /// overload name (`iterate` / `terminate` / ... for aggregates, spec.md
    /// §4.5).
    Func {
        udf_class: String,
        method: String,
        args: Vec<Expr>,
        is_distinct: bool,
    },
    /// `.field` / `[index]` access into a struct or list value, spec.md §4.4.
    Field {
        parent: Box<Expr>,
        field_name: String,
        is_list: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeInfo,
}

impl Expr {
    pub fn null() -> Self {
        Expr {
            kind: ExprKind::Null,
            ty: TypeInfo::Primitive(PrimitiveType::Void),
        }
    }

    pub fn null_of(ty: TypeInfo) -> Self {
        Expr {
            kind: ExprKind::Null,
            ty,
        }
    }

    pub fn constant(c: Constant, ty: PrimitiveType) -> Self {
        Expr {
            kind: ExprKind::Constant(c),
            ty: TypeInfo::Primitive(ty),
        }
    }

    pub fn column(internal_name: impl Into<String>, ty: TypeInfo) -> Self {
        Expr {
            kind: ExprKind::Column(internal_name.into()),
            ty,
        }
    }

    pub fn func(
        udf_class: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Expr>,
        is_distinct: bool,
        ty: TypeInfo,
    ) -> Self {
        Expr {
            kind: ExprKind::Func {
                udf_class: udf_class.into(),
                method: method.into(),
                args,
                is_distinct,
            },
            ty,
        }
    }

    /// Structural canonicalization used by the expression compiler's reuse
    /// rule (spec.md §4.4: "If a subexpression's canonical text is already
    /// bound in the resolver ... reuse its column reference").
    pub fn canonical_text(&self) -> String {
        match &self.kind {
            ExprKind::Null => "NULL".to_string(),
            ExprKind::Constant(c) => format!("{c:?}"),
            ExprKind::Column(name) => format!("col:{name}"),
            ExprKind::Func {
                udf_class,
                args,
                is_distinct,
                ..
            } => {
                let args_text: Vec<_> = args.iter().map(Expr::canonical_text).collect();
                format!(
                    "{udf_class}({}{})",
                    if *is_distinct { "distinct " } else { "" },
                    args_text.join(",")
                )
            }
            ExprKind::Field {
                parent,
                field_name,
                is_list,
            } => {
                if *is_list {
                    format!("{}[{}]", parent.canonical_text(), field_name)
                } else {
                    format!("{}.{}", parent.canonical_text(), field_name)
                }
            }
        }
    }

    /// Every internal column name referenced transitively, used by filter
    /// classification (spec.md §4.1 join processing) and partition pruning
    /// (spec.md §4.7).
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match &self.kind {
            ExprKind::Column(name) => out.push(name.clone()),
            ExprKind::Func { args, .. } => {
                for a in args {
                    a.referenced_columns(out);
                }
            }
            ExprKind::Field { parent, .. } => parent.referenced_columns(out),
            ExprKind::Null | ExprKind::Constant(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_text_reuse_key_is_stable() {
        let a = Expr::func(
            "count",
            "iterate",
            vec![Expr::column("0", TypeInfo::Primitive(PrimitiveType::Long))],
            false,
            TypeInfo::Primitive(PrimitiveType::Long),
        );
        let b = Expr::func(
            "count",
            "iterate",
            vec![Expr::column("0", TypeInfo::Primitive(PrimitiveType::Long))],
            false,
            TypeInfo::Primitive(PrimitiveType::Long),
        );
        assert_eq!(a.canonical_text(), b.canonical_text());
    }

    #[test]
    fn referenced_columns_walks_through_functions() {
        let e = Expr::func(
            "concat",
            "iterate",
            vec![
                Expr::column("0", TypeInfo::Primitive(PrimitiveType::String)),
                Expr::column("1", TypeInfo::Primitive(PrimitiveType::String)),
            ],
            false,
            TypeInfo::Primitive(PrimitiveType::String),
        );
        let mut cols = Vec::new();
        e.referenced_columns(&mut cols);
        assert_eq!(cols, vec!["0".to_string(), "1".to_string()]);
    }
}
