//! Expression evaluation
//!
//! Evaluates an `Expr` against a row, resolving procedure variables through a
//! `VariableLookup`. NULL propagates through arithmetic and comparison; AND,
//! OR and NOT follow SQL three-valued logic.

use std::cmp::Ordering;

use crate::sql::{BinaryOp, Expr, UnaryOp};

use super::context::VariableLookup;
use super::datum::Datum;
use super::error::{ExecutorError, ExecutorResult};
use super::row::Row;

/// Lookup that knows no variables
pub struct NoVariables;

impl VariableLookup for NoVariables {
    fn lookup(&self, _name: &str) -> Option<Datum> {
        None
    }
}

pub fn eval(expr: &Expr, row: &Row) -> ExecutorResult<Datum> {
    eval_with(expr, row, &NoVariables)
}

/// Evaluate criteria; NULL and FALSE both reject the row
pub fn eval_criteria(expr: &Expr, row: &Row, vars: &dyn VariableLookup) -> ExecutorResult<bool> {
    Ok(eval_with(expr, row, vars)?.as_bool().unwrap_or(false))
}

pub fn eval_with(expr: &Expr, row: &Row, vars: &dyn VariableLookup) -> ExecutorResult<Datum> {
    let value = match expr {
        Expr::Column(col) => row.get(col.index)?.clone(),
        Expr::Literal(lit) => Datum::from(lit),
        Expr::Variable(name) => vars
            .lookup(name)
            .ok_or_else(|| ExecutorError::UnknownVariable(name.clone()))?,
        Expr::BinaryOp { left, op, right } => {
            let left = eval_with(left, row, vars)?;
            let right = eval_with(right, row, vars)?;
            binary(*op, left, right)?
        }
        Expr::UnaryOp { op, expr } => unary(*op, eval_with(expr, row, vars)?)?,
        Expr::Function { name, args } => {
            let args = args
                .iter()
                .map(|a| eval_with(a, row, vars))
                .collect::<ExecutorResult<Vec<_>>>()?;
            function(name, args)?
        }
        Expr::IsNull { expr, negated } => {
            Datum::Bool(eval_with(expr, row, vars)?.is_null() != *negated)
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let needle = eval_with(expr, row, vars)?;
            if needle.is_null() {
                return Ok(Datum::Null);
            }
            let mut unknown = false;
            let mut found = false;
            for item in list {
                let item = eval_with(item, row, vars)?;
                if item.is_null() {
                    unknown = true;
                } else if item == needle {
                    found = true;
                    break;
                }
            }
            match (found, unknown) {
                (false, true) => Datum::Null,
                _ => Datum::Bool(found != *negated),
            }
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = eval_with(expr, row, vars)?;
            let low = eval_with(low, row, vars)?;
            let high = eval_with(high, row, vars)?;
            if value.is_null() || low.is_null() || high.is_null() {
                Datum::Null
            } else {
                Datum::Bool((low <= value && value <= high) != *negated)
            }
        }
    };
    Ok(value)
}

fn binary(op: BinaryOp, left: Datum, right: Datum) -> ExecutorResult<Datum> {
    if op != BinaryOp::And && op != BinaryOp::Or && (left.is_null() || right.is_null()) {
        return Ok(Datum::Null);
    }
    let ordering = || left.cmp(&right);
    Ok(match op {
        BinaryOp::Eq => Datum::Bool(ordering() == Ordering::Equal),
        BinaryOp::NotEq => Datum::Bool(ordering() != Ordering::Equal),
        BinaryOp::Lt => Datum::Bool(ordering() == Ordering::Less),
        BinaryOp::LtEq => Datum::Bool(ordering() != Ordering::Greater),
        BinaryOp::Gt => Datum::Bool(ordering() == Ordering::Greater),
        BinaryOp::GtEq => Datum::Bool(ordering() != Ordering::Less),
        BinaryOp::Like | BinaryOp::NotLike => match (left.as_str(), right.as_str()) {
            (Some(s), Some(p)) => Datum::Bool(like(s, p) == (op == BinaryOp::Like)),
            _ => {
                return Err(ExecutorError::TypeMismatch(format!(
                    "LIKE requires strings, got {} and {}",
                    left, right
                )))
            }
        },
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Mod => arithmetic(op, &left, &right)?,
        BinaryOp::And => and(left.as_bool(), right.as_bool()),
        BinaryOp::Or => or(left.as_bool(), right.as_bool()),
    })
}

fn and(left: Option<bool>, right: Option<bool>) -> Datum {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Datum::Bool(false),
        (Some(true), Some(true)) => Datum::Bool(true),
        _ => Datum::Null,
    }
}

fn or(left: Option<bool>, right: Option<bool>) -> Datum {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Datum::Bool(true),
        (Some(false), Some(false)) => Datum::Bool(false),
        _ => Datum::Null,
    }
}

fn arithmetic(op: BinaryOp, left: &Datum, right: &Datum) -> ExecutorResult<Datum> {
    if let (Datum::String(a), Datum::String(b), BinaryOp::Add) = (left, right, op) {
        return Ok(Datum::String(format!("{}{}", a, b)));
    }
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && right.as_float() == Some(0.0) {
        return Err(ExecutorError::InvalidOperation("division by zero".to_string()));
    }

    if let (Datum::Int(a), Datum::Int(b)) = (left, right) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Div => a.checked_div(*b),
            _ => a.checked_rem(*b),
        };
        return result.map(Datum::Int).ok_or_else(|| {
            ExecutorError::InvalidOperation(format!("integer overflow in {} {} {}", a, op.symbol(), b))
        });
    }

    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => Ok(Datum::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => a % b,
        })),
        _ => Err(ExecutorError::TypeMismatch(format!(
            "cannot apply {} to {} and {}",
            op.symbol(),
            left,
            right
        ))),
    }
}

fn unary(op: UnaryOp, value: Datum) -> ExecutorResult<Datum> {
    match (op, value) {
        (_, Datum::Null) => Ok(Datum::Null),
        (UnaryOp::Not, v) => match v.as_bool() {
            Some(b) => Ok(Datum::Bool(!b)),
            None => Err(ExecutorError::TypeMismatch(format!("NOT requires a boolean, got {}", v))),
        },
        (UnaryOp::Neg, Datum::Int(i)) => i
            .checked_neg()
            .map(Datum::Int)
            .ok_or_else(|| ExecutorError::InvalidOperation(format!("integer overflow in -{}", i))),
        (UnaryOp::Neg, Datum::Float(f)) => Ok(Datum::Float(-f)),
        (UnaryOp::Neg, v) => Err(ExecutorError::TypeMismatch(format!(
            "negation requires a number, got {}",
            v
        ))),
    }
}

/// SQL LIKE: `%` matches any run, `_` one character, `\` escapes
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    // Position after the last `%` and the text position it is trying
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                p += 1;
                backtrack = Some((p, t));
                continue;
            }
            Some('_') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((bp, bt)) => {
                p = bp;
                t = bt + 1;
                backtrack = Some((bp, bt + 1));
            }
            None => return false,
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

fn function(name: &str, args: Vec<Datum>) -> ExecutorResult<Datum> {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "COALESCE" => return Ok(args.into_iter().find(|a| !a.is_null()).unwrap_or_default()),
        "CONCAT" => {
            if args.iter().any(Datum::is_null) {
                return Ok(Datum::Null);
            }
            return Ok(Datum::String(args.iter().map(|a| a.to_string()).collect()));
        }
        _ => {}
    }

    let arity = match upper.as_str() {
        "UPPER" | "UCASE" | "LOWER" | "LCASE" | "LENGTH" | "LEN" | "ABS" => 1,
        "NULLIF" => 2,
        _ => {
            return Err(ExecutorError::InvalidOperation(format!(
                "unknown function: {}",
                name
            )))
        }
    };
    if args.len() != arity {
        return Err(ExecutorError::InvalidOperation(format!(
            "{} expects {} argument(s), got {}",
            upper,
            arity,
            args.len()
        )));
    }

    let mut args = args.into_iter();
    let first = args.next().unwrap_or_default();
    if upper == "NULLIF" {
        let second = args.next().unwrap_or_default();
        return Ok(if first == second { Datum::Null } else { first });
    }
    Ok(match (upper.as_str(), first) {
        (_, Datum::Null) => Datum::Null,
        ("UPPER" | "UCASE", Datum::String(s)) => Datum::String(s.to_uppercase()),
        ("LOWER" | "LCASE", Datum::String(s)) => Datum::String(s.to_lowercase()),
        ("LENGTH" | "LEN", Datum::String(s)) => Datum::Int(s.chars().count() as i64),
        ("LENGTH" | "LEN", Datum::Bytes(b)) => Datum::Int(b.len() as i64),
        ("ABS", Datum::Int(i)) => Datum::Int(i.saturating_abs()),
        ("ABS", Datum::Float(f)) => Datum::Float(f.abs()),
        (_, other) => {
            return Err(ExecutorError::TypeMismatch(format!(
                "{} does not accept {}",
                upper, other
            )))
        }
    })
}
