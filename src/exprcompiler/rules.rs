//! Rule-driven AST-to-typed-expression walker (spec.md §4.4).
//!
//! Grounded on the teacher's `semantic::resolver::transforms` dispatch,
//! generalized into a regex-keyed rule table (spec.md §4.4, §9): each
//! source node shape is mapped to a short tag, and a table of `(pattern,
//! handler)` pairs is scanned in order for the first regex that matches
//! the tag. The tag alphabet is small and closed so most patterns are
//! exact tags, but a handful cover a family of related shapes (`AND`/`OR`,
//! `=`/`!=`) with a single alternation instead of a duplicated arm.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{AstNode, TokenKind};
use crate::error::{Result, SemanticError, SemanticErrorKind};
use crate::ir::expr::{Constant, Expr, ExprKind};
use crate::ir::types::{classify_numeric_literal, PrimitiveType, TypeInfo};
use crate::metastore::FunctionRegistry;
use crate::rowresolver::RowResolver;

/// True when `node`'s first child is the `DISTINCT` marker a `Function`
/// node carries ahead of its argument list.
fn is_distinct_marker(node: &AstNode) -> bool {
    matches!(node.children.first(), Some(c) if c.kind == TokenKind::Other && c.text == "DISTINCT")
}

fn boolean_const(b: bool) -> Expr {
    Expr::constant(Constant::Boolean(b), PrimitiveType::Boolean)
}

/// Tag a node is dispatched on. Kept distinct from `TokenKind` itself so a
/// rule's pattern can group several kinds (`AND`/`OR`) without the handler
/// losing access to which one actually fired.
fn node_tag(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Null => "NUL",
        TokenKind::Number => "NUM",
        TokenKind::StringLiteral => "STR",
        TokenKind::Identifier => "IDN",
        TokenKind::True => "TRU",
        TokenKind::False => "FLS",
        TokenKind::ColRef => "COL",
        TokenKind::And => "AND",
        TokenKind::Or => "ORR",
        TokenKind::Not => "NOT",
        TokenKind::Equal => "EQU",
        TokenKind::NotEqual => "NEQ",
        TokenKind::Dot => "DOT",
        TokenKind::Index => "IDX",
        TokenKind::Function => "FUN",
        _ => "OTH",
    }
}

type Rule = fn(&AstNode, &RowResolver, &dyn FunctionRegistry) -> Result<Expr>;

static RULES: Lazy<Vec<(Regex, Rule)>> = Lazy::new(|| {
    vec![
        (Regex::new("^NUL$").unwrap(), rule_null as Rule),
        (Regex::new("^NUM$").unwrap(), rule_number as Rule),
        (Regex::new("^(STR|IDN)$").unwrap(), rule_string_like as Rule),
        (Regex::new("^TRU$").unwrap(), rule_true as Rule),
        (Regex::new("^FLS$").unwrap(), rule_false as Rule),
        (Regex::new("^COL$").unwrap(), rule_colref as Rule),
        (Regex::new("^(AND|ORR)$").unwrap(), rule_and_or as Rule),
        (Regex::new("^NOT$").unwrap(), rule_not as Rule),
        (Regex::new("^(EQU|NEQ)$").unwrap(), rule_equal as Rule),
        (Regex::new("^DOT$").unwrap(), rule_dot as Rule),
        (Regex::new("^IDX$").unwrap(), rule_index as Rule),
        (Regex::new("^FUN$").unwrap(), rule_function as Rule),
    ]
});

/// Walks `node` depth-first, producing a typed expression descriptor. Picks
/// the first rule in `RULES` whose pattern matches `node`'s tag.
pub fn compile_expr(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let tag = node_tag(node.kind);
    for (pattern, handler) in RULES.iter() {
        if pattern.is_match(tag) {
            return handler(node, resolver, functions);
        }
    }
    Err(SemanticError::new(
        SemanticErrorKind::Generic,
        format!("expression compiler has no rule for token kind {:?}", node.kind),
    )
    .at(node.pos))
}

fn rule_null(_node: &AstNode, _resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    Ok(Expr::null())
}

fn rule_number(node: &AstNode, _resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    let ty = classify_numeric_literal(&node.text).ok_or_else(|| {
        SemanticError::new(
            SemanticErrorKind::InvalidNumericalConstant,
            format!("`{}` is not a valid numeric literal", node.text),
        )
        .with_token(node.text.clone())
        .at(node.pos)
    })?;
    let constant = match ty {
        PrimitiveType::Double => Constant::Double(node.text.parse().unwrap()),
        _ => Constant::Integer(node.text.parse().unwrap()),
    };
    Ok(Expr::constant(constant, ty))
}

fn rule_string_like(node: &AstNode, _resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    Ok(Expr::constant(Constant::String(node.text.clone()), PrimitiveType::String))
}

fn rule_true(_node: &AstNode, _resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    Ok(boolean_const(true))
}

fn rule_false(_node: &AstNode, _resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    Ok(boolean_const(false))
}

fn rule_colref(node: &AstNode, resolver: &RowResolver, _functions: &dyn FunctionRegistry) -> Result<Expr> {
    let alias = node.first_child_of_kind(TokenKind::Identifier).map(|c| c.text.as_str());
    let column = resolver.get(alias, &node.text).map_err(|e| e.at(node.pos))?;
    Ok(Expr::column(column.internal_name.clone(), column.ty.clone()))
}

fn rule_and_or(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let op = if node.kind == TokenKind::And { "and" } else { "or" };
    let args = compile_children(node, resolver, functions)?;
    Ok(Expr::func(op, "evaluate", args, false, TypeInfo::Primitive(PrimitiveType::Boolean)))
}

fn rule_not(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let args = compile_children(node, resolver, functions)?;
    Ok(Expr::func("not", "evaluate", args, false, TypeInfo::Primitive(PrimitiveType::Boolean)))
}

fn rule_equal(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let op = if node.kind == TokenKind::Equal { "=" } else { "!=" };
    let args = compile_children(node, resolver, functions)?;
    Ok(Expr::func(op, "evaluate", args, false, TypeInfo::Primitive(PrimitiveType::Boolean)))
}

fn rule_dot(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    compile_field_access(node, resolver, functions, false)
}

fn rule_index(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    compile_field_access(node, resolver, functions, true)
}

fn rule_function(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let is_distinct = is_distinct_marker(node);
    let arg_nodes: Vec<&AstNode> = node
        .children
        .iter()
        .filter(|c| !(c.kind == TokenKind::Other && c.text == "DISTINCT"))
        .collect();
    let mut args = Vec::with_capacity(arg_nodes.len());
    for a in arg_nodes {
        args.push(compile_expr(a, resolver, functions)?);
    }
    compile_function(&node.text, args, is_distinct, functions).map_err(|e| e.at(node.pos))
}

fn compile_children(node: &AstNode, resolver: &RowResolver, functions: &dyn FunctionRegistry) -> Result<Vec<Expr>> {
    node.children.iter().map(|c| compile_expr(c, resolver, functions)).collect()
}

fn compile_field_access(
    node: &AstNode,
    resolver: &RowResolver,
    functions: &dyn FunctionRegistry,
    is_list: bool,
) -> Result<Expr> {
    let parent_node = node.child(0).ok_or_else(|| {
        SemanticError::new(SemanticErrorKind::InvalidDot, "field access missing parent expression").at(node.pos)
    })?;
    let parent = compile_expr(parent_node, resolver, functions)?;

    if is_list {
        let index_node = node.child(1).ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::InvalidArrayIndexConstant, "missing index expression").at(node.pos)
        })?;
        let element_ty = match &parent.ty {
            TypeInfo::List(elem) => (**elem).clone(),
            TypeInfo::Map(_, v) => (**v).clone(),
            _ => {
                return Err(SemanticError::new(
                    SemanticErrorKind::NonCollectionType,
                    "index access on a non-list, non-map value",
                )
                .at(node.pos))

            }
        };
        let index = compile_expr(index_node, resolver, functions)?;
        let field_name = match &index.kind {
            ExprKind::Constant(Constant::Integer(i)) => i.to_string(),
            ExprKind::Constant(Constant::String(s)) => s.clone(),
            _ => {
                let kind = if matches!(parent.ty, TypeInfo::Map(_, _)) {
                    SemanticErrorKind::InvalidMapIndexConstant
                } else {
                    SemanticErrorKind::InvalidArrayIndexConstant
                };
                return Err(SemanticError::new(kind, "index expression must be a constant").at(node.pos));
            }
        };
        Ok(Expr {
            kind: ExprKind::Field {
                parent: Box::new(parent),
                field_name,
                is_list: true,
            },
            ty: element_ty,
        })
    } else {
        let field_node = node.child(1).ok_or_else(|| {
            SemanticError::new(SemanticErrorKind::InvalidDot, "field access missing field name").at(node.pos)
        })?;
        let field_ty = parent
            .ty
            .field(&field_node.text)
            .cloned()
            .ok_or_else(|| {
                SemanticError::new(
                    SemanticErrorKind::NonCollectionType,
                    format!("`{}` is not a field of the parent struct", field_node.text),
                )
                .at(node.pos)
            })?;
        Ok(Expr {
            kind: ExprKind::Field {
                parent: Box::new(parent),
                field_name: field_node.text.clone(),
                is_list: false,
            },
            ty: field_ty,
        })
    }
}

/// Resolves `name(args...)` against the function registry, retrying once
/// with each argument coerced to the pairwise common class when the direct
/// lookup fails (spec.md §4.4 implicit coercion).
fn compile_function(name: &str, args: Vec<Expr>, is_distinct: bool, functions: &dyn FunctionRegistry) -> Result<Expr> {
    let arg_types: Vec<TypeInfo> = args.iter().map(|a| a.ty.clone()).collect();
    if let Some(sig) = functions.get_udf(name, &arg_types) {
        return Ok(Expr::func(sig.udf_class, "evaluate", args, is_distinct, sig.return_type));
    }

    if args.len() == 2 {
        if let Some(common) = functions.common_class(&arg_types[0], &arg_types[1]) {
            let coerced: Vec<Expr> = args
                .into_iter()
                .zip(arg_types.iter())
                .map(|(a, t)| coerce(a, t, &common, functions))
                .collect();
            let coerced_types: Vec<TypeInfo> = coerced.iter().map(|a| a.ty.clone()).collect();
            if let Some(sig) = functions.get_udf(name, &coerced_types) {
                return Ok(Expr::func(sig.udf_class, "evaluate", coerced, is_distinct, sig.return_type));
            }
            return Err(SemanticError::new(
                SemanticErrorKind::InvalidFunctionSignature,
                format!("no overload of `{name}` matches the given argument types"),
            ));
        }
    }

    Err(SemanticError::new(
        SemanticErrorKind::InvalidFunction,
        format!("unknown function `{name}`"),
    ))
}

fn coerce(expr: Expr, from: &TypeInfo, to: &TypeInfo, functions: &dyn FunctionRegistry) -> Expr {
    if from == to || !functions.implicit_convertible(from, to) {
        return expr;
    }
    let target_name = to.as_primitive().map(PrimitiveType::type_name).unwrap_or("");
    match functions.conversion_udf(target_name, from) {
        Some(udf) => Expr::func(udf, "evaluate", vec![expr], false, to.clone()),
        None => expr,
    }
}
