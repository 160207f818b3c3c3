//! Value types carried by typed expression descriptors (spec.md §3, "All
//! carry a `TypeInfo`"). Grounded on the shape of the teacher's
//! `prqlc_ast::types::Ty` / `TyKind` enum: a small closed set of primitives
//! plus recursive container kinds, `Clone`-cheap and comparable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    Void,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    String,
    Binary,
    Date,
    Timestamp,
}

impl PrimitiveType {
    /// Numeric widening rank used by implicit coercion (spec.md §4.4): a
    /// lower rank can always be widened to a higher one.
    pub fn numeric_rank(self) -> Option<u8> {
        use PrimitiveType::*;
        match self {
            Byte => Some(0),
            Short => Some(1),
            Integer => Some(2),
            Long => Some(3),
            Float => Some(4),
            Double => Some(5),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Lowercase type name used as the `conversion_udf` lookup key
    /// (spec.md §4.4).
    pub fn type_name(self) -> &'static str {
        use PrimitiveType::*;
        match self {
            Void => "void",
            Boolean => "boolean",
            Byte => "byte",
            Short => "short",
            Integer => "int",
            Long => "bigint",
            Float => "float",
            Double => "double",
            String => "string",
            Binary => "binary",
            Date => "date",
            Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeInfo {
    Primitive(PrimitiveType),
    List(Box<TypeInfo>),
    Map(Box<TypeInfo>, Box<TypeInfo>),
    Struct(Vec<(String, TypeInfo)>),
}

impl TypeInfo {
    pub fn prim(p: PrimitiveType) -> Self {
        TypeInfo::Primitive(p)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeInfo::Primitive(_))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeInfo::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::List(t) => Some(t),
            _ => None,
        }
    }
}

/// Smallest numeric type a literal fits in, spec.md §4.4: "Integer if fits,
/// else Long, else Double".
pub fn smallest_fitting_integral(text: &str) -> Option<PrimitiveType> {
    if let Ok(v) = text.parse::<i64>() {
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            return Some(PrimitiveType::Integer);
        }
        return Some(PrimitiveType::Long);
    }
    None
}

/// Full numeric-literal classification, spec.md §4.4: integral text picks
/// the narrowest of Integer/Long that fits, anything else parseable as a
/// float falls back to Double.
pub fn classify_numeric_literal(text: &str) -> Option<PrimitiveType> {
    smallest_fitting_integral(text).or_else(|| text.parse::<f64>().ok().map(|_| PrimitiveType::Double))
}
