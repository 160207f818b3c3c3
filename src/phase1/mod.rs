//! Phase-1 analyzer (spec.md §4.1, component 3): the single AST traversal
//! that populates `Qb`/`QbExpr` trees.

pub mod analyzer;

pub use analyzer::analyze;
