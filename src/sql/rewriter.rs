//! Criteria rewriting
//!
//! Static simplification of criteria and commands. Folding only ever
//! replaces an expression with something equivalent under SQL three-valued
//! logic; anything that cannot be evaluated is left untouched, so callers
//! that prune work based on a false criteria only prune provably empty
//! commands.

use crate::executor::eval::eval;
use crate::executor::row::Row;

use super::ast::{BinaryOp, Command, Expr, Literal, UnaryOp};

/// Simplify an expression by folding constant sub-expressions
pub fn simplify(expr: Expr) -> Expr {
    expr.transform(&mut fold_node)
}

fn fold_node(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOp::And,
            right,
        } => match (as_bool_literal(&left), as_bool_literal(&right)) {
            (Some(false), _) | (_, Some(false)) => Expr::boolean(false),
            (Some(true), _) => *right,
            (_, Some(true)) => *left,
            _ => fold_constant(Expr::BinaryOp {
                left,
                op: BinaryOp::And,
                right,
            }),
        },
        Expr::BinaryOp {
            left,
            op: BinaryOp::Or,
            right,
        } => match (as_bool_literal(&left), as_bool_literal(&right)) {
            (Some(true), _) | (_, Some(true)) => Expr::boolean(true),
            (Some(false), _) => *right,
            (_, Some(false)) => *left,
            _ => fold_constant(Expr::BinaryOp {
                left,
                op: BinaryOp::Or,
                right,
            }),
        },
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr,
        } => match *expr {
            Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: inner,
            } => *inner,
            other => fold_constant(Expr::not(other)),
        },
        other => fold_constant(other),
    }
}

/// Replace a fully constant expression with its value; evaluation errors
/// (e.g. division by zero) keep the expression so the error surfaces at
/// execution time
fn fold_constant(expr: Expr) -> Expr {
    if matches!(expr, Expr::Literal(_)) || !expr.is_constant() {
        return expr;
    }
    match eval(&expr, &Row::empty()) {
        Ok(datum) => Expr::Literal(Literal::from(datum)),
        Err(_) => expr,
    }
}

fn as_bool_literal(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal(Literal::Boolean(b)) => Some(*b),
        _ => None,
    }
}

/// True if criteria can never select a row (FALSE or UNKNOWN)
pub fn is_false_criteria(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Literal(Literal::Boolean(false)) | Expr::Literal(Literal::Null)
    )
}

/// True if criteria selects every row
pub fn is_true_criteria(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Literal::Boolean(true)))
}

/// Split criteria into its AND-separated conjuncts
pub fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOp::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// Combine conjuncts with AND; `None` when empty
pub fn combine_conjuncts(parts: Vec<Expr>) -> Option<Expr> {
    parts.into_iter().reduce(Expr::and)
}

/// AND `extra` onto optional existing criteria
pub fn and_criteria(existing: Option<Expr>, extra: Expr) -> Expr {
    match existing {
        Some(e) => Expr::and(e, extra),
        None => extra,
    }
}

/// Replace references to element `name` with `value`
pub fn substitute_element(expr: Expr, name: &str, value: &Literal) -> Expr {
    expr.transform(&mut |e| match e {
        Expr::Column(col) if col.is_named(name) => Expr::Literal(value.clone()),
        other => other,
    })
}

/// Simplify the criteria held by a command; a TRUE criteria is removed
pub fn simplify_command(command: &mut Command) {
    if let Command::Batched(cmds) = command {
        cmds.iter_mut().for_each(simplify_command);
        return;
    }
    if let Some(slot) = command.criteria_mut() {
        if let Some(criteria) = slot.take() {
            let simplified = simplify(criteria);
            if !is_true_criteria(&simplified) {
                *slot = Some(simplified);
            }
        }
    }
}

/// True if a command is statically known to select or affect nothing
pub fn selects_nothing(command: &Command) -> bool {
    match command {
        Command::Query(q) => {
            q.limit == Some(0) || q.criteria.as_ref().is_some_and(is_false_criteria)
        }
        Command::Update(u) => u.criteria.as_ref().is_some_and(is_false_criteria),
        Command::Delete(d) => d.criteria.as_ref().is_some_and(is_false_criteria),
        Command::Insert(i) => i.values.is_empty(),
        Command::Batched(cmds) => cmds.iter().all(selects_nothing),
    }
}
