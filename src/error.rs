//! Compiler error type (spec.md §7).
//!
//! Shaped after the teacher's `prqlc_parser::error::Error` /
//! `ErrorSource` / `Reason`: one concrete error struct carrying a
//! machine-readable kind, an optional source span, a human-readable
//! reason, hints, and an optional upstream cause, plus a `SemanticErrors`
//! wrapper for the (rare, since the compiler aborts on first error)
//! multi-error case.

use std::fmt;

use crate::ast::SourcePos;

/// Closed taxonomy of semantic errors, spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr, serde::Serialize)]
pub enum SemanticErrorKind {
    InvalidTable,
    InvalidColumn,
    AmbiguousColumn,
    AmbiguousTableAlias,
    InvalidTableAlias,
    NoSubqueryAlias,
    NoInsertInSubquery,
    InvalidFunction,
    InvalidFunctionSignature,
    InvalidOperatorSignature,
    InvalidJoinCondition1,
    InvalidJoinCondition2,
    InvalidJoinCondition3,
    InvalidTransform,
    DuplicateGroupByKey,
    UnsupportedMultipleDistincts,
    NonKeyExprInGroupBy,
    InvalidXPath,
    InvalidPath,
    InvalidNumericalConstant,
    InvalidArrayIndexConstant,
    InvalidMapIndexConstant,
    InvalidMapIndexType,
    NonCollectionType,
    SelectDistinctWithGroupBy,
    ColumnRepeatedInPartitioningCols,
    DuplicateColumnNames,
    ColumnRepeatedInClusterSort,
    SampleRestriction,
    SampleColumnNotFound,
    NoPartitionPredicate,
    InvalidDot,
    InvalidTblDdlSerde,
    TargetTableColumnMismatch,
    TableAliasNotAllowed,
    ClusterByDistributeByConflict,
    ClusterBySortByConflict,
    UnionNotInSubquery,
    InvalidInputFormatType,
    InvalidOutputFormatType,
    NonBucketedTable,
    Generic,
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Option<SourcePos>,
    pub reason: String,
    pub hints: Vec<String>,
    pub token_text: Option<String>,
    source: Option<String>,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, reason: impl Into<String>) -> Self {
        SemanticError {
            kind,
            span: None,
            reason: reason.into(),
            hints: Vec::new(),
            token_text: None,
            source: None,
        }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.span = Some(pos);
        self
    }

    pub fn with_token(mut self, text: impl Into<String>) -> Self {
        self.token_text = Some(text.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Wraps an upstream collaborator failure (metastore I/O, etc.) as
    /// `Generic`, per spec.md §7.
    pub fn wrap(cause: impl fmt::Display) -> Self {
        SemanticError {
            kind: SemanticErrorKind::Generic,
            span: None,
            reason: cause.to_string(),
            hints: Vec::new(),
            token_text: None,
            source: Some(cause.to_string()),
        }
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)?;
        if let Some(span) = &self.span {
            write!(f, " (at {span})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SemanticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct SemanticErrors(pub Vec<SemanticError>);

impl From<SemanticError> for SemanticErrors {
    fn from(e: SemanticError) -> Self {
        SemanticErrors(vec![e])
    }
}

impl fmt::Display for SemanticErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SemanticErrors {}

pub type Result<T> = std::result::Result<T, SemanticError>;

/// Extension trait mirroring the teacher's `WithErrorInfo`, letting call
/// sites attach span/hint context to an error returned from a nested call
/// without restructuring the `?` chain.
pub trait WithErrorInfo {
    fn at_pos(self, pos: SourcePos) -> Self;
    fn hint(self, hint: impl Into<String>) -> Self;
}

impl<T> WithErrorInfo for Result<T> {
    fn at_pos(self, pos: SourcePos) -> Self {
        self.map_err(|e| if e.span.is_none() { e.at(pos) } else { e })
    }

    fn hint(self, hint: impl Into<String>) -> Self {
        self.map_err(|e| e.with_hint(hint))
    }
}
