//! AST adapter (spec.md §4.1, component 1).
//!
//! The lexer/parser is an external collaborator (spec.md §1); this module
//! only defines the contract the analyzer expects the parser to hand it: an
//! immutable tree of opaque nodes carrying a token kind, source text and
//! location, and ordered children. Analogous in spirit to the teacher's
//! lexer/parser output (`prqlc_parser::lexer::lr` / `parser::pr`), but kept
//! generic over *token kind* rather than PRQL-shaped, since this compiler's
//! source language is a different, already-parsed surface.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One row/column location in the original query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The token kinds the phase-1 analyzer and expression compiler dispatch on.
///
/// This is the closed set named across spec.md §4.1/§4.4/§4.6/§4.9; `Other`
/// covers leaf literal/identifier tokens the grammar appendix does not name
/// individually (function names, identifiers, literal text), which are
/// disambiguated by the dispatcher using node shape rather than kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Query,
    Select,
    SelectDistinct,
    Where,
    Destination,
    From,
    TabRef,
    SubQuery,
    Join,
    LeftOuterJoin,
    RightOuterJoin,
    FullOuterJoin,
    JoinCond,
    ClusterBy,
    DistributeBy,
    SortBy,
    GroupBy,
    Limit,
    Union,
    UnionAll,
    Transform,
    TableSample,

    // expression node kinds
    Null,
    Number,
    StringLiteral,
    True,
    False,
    ColRef,
    Function,
    Dot,
    Index,
    And,
    Or,
    Not,
    Equal,
    NotEqual,

    Identifier,
    Other,
}

/// An opaque, immutable parse-tree node.
///
/// Mirrors Hive-style ASTNode trees: a token kind, the raw source text for
/// leaf tokens, a source position, and an ordered list of children. The
/// analyzer never mutates a node; all derived state lives in the `QB`/
/// operator structures built alongside the walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        AstNode {
            kind,
            text: text.into(),
            pos: SourcePos { line: 0, column: 0 },
            children: Vec::new(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.pos = SourcePos { line, column };
        self
    }

    pub fn with_children(mut self, children: Vec<AstNode>) -> Self {
        self.children = children;
        self
    }

    pub fn child(&self, i: usize) -> Option<&AstNode> {
        self.children.get(i)
    }

    pub fn children_of_kind(&self, kind: TokenKind) -> impl Iterator<Item = &AstNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    pub fn first_child_of_kind(&self, kind: TokenKind) -> Option<&AstNode> {
        self.children_of_kind(kind).next()
    }

    /// Canonical structural text, used to recognize repeated subtrees (e.g.
    /// an aggregation expression referenced both in the select list and
    /// implicitly via `HAVING`) without comparing full subtrees. Spec.md
    /// §4.1/§4.5 call this "canonicalized by structural text".
    pub fn canonical_text(&self) -> String {
        fn go(node: &AstNode, out: &mut String) {
            out.push('(');
            out.push_str(&format!("{:?}", node.kind));
            if node.children.is_empty() {
                out.push(':');
                out.push_str(&node.text);
            }
            for c in &node.children {
                go(c, out);
            }
            out.push(')');
        }
        let mut s = String::new();
        go(self, &mut s);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_text_is_structural() {
        let a = AstNode::new(TokenKind::Function, "count").with_children(vec![AstNode::new(
            TokenKind::ColRef,
            "x",
        )]);
        let b = AstNode::new(TokenKind::Function, "count")
            .with_children(vec![AstNode::new(TokenKind::ColRef, "x").at(9, 9)]);
        assert_eq!(a.canonical_text(), b.canonical_text());
    }
}
