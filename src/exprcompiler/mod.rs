//! Expression compiler (spec.md §4.4, component 5).

pub mod rules;

pub use rules::compile_expr;
