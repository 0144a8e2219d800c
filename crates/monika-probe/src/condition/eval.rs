//! Tree-walking evaluator.

use std::borrow::Cow;
use std::cmp::Ordering;

use super::parser::{BinaryOp, Expr};
use super::{ConditionError, ResponseContext};

/// Runtime value. Response fields are borrowed from the context.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'a, str>),
    List(Vec<Value<'a>>),
    /// Inclusive integer range.
    Range(i64, i64),
    /// The `response` root object.
    Response,
    /// The `response.headers` map.
    Headers,
}

impl Value<'_> {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "array",
            Value::Range(..) => "range",
            Value::Response => "response",
            Value::Headers => "map",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

type EvalResult<'a> = Result<Value<'a>, ConditionError>;

pub(crate) fn eval<'a>(expr: &Expr, ctx: &ResponseContext<'a>) -> EvalResult<'a> {
    match expr {
        Expr::Nil => Ok(Value::Nil),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(n) => Ok(Value::Float(*n)),
        Expr::Str(s) => Ok(Value::Str(Cow::Owned(s.clone()))),
        Expr::Ident(name) => match name.as_str() {
            "response" => Ok(Value::Response),
            _ => Err(ConditionError::UnknownIdentifier(name.clone())),
        },
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Member(object, field) => {
            let object = eval(object, ctx)?;
            member(object, field, ctx)
        }
        Expr::Index(object, index) => {
            let object = eval(object, ctx)?;
            let index = eval(index, ctx)?;
            match (object, index) {
                (object @ (Value::Response | Value::Headers), Value::Str(key)) => {
                    member(object, &key, ctx)
                }
                (Value::List(items), Value::Int(i)) => usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| ConditionError::Invalid(format!("index {i} out of range"))),
                (object, index) => Err(mismatch("[]", &object, &index)),
            }
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args, ctx)
        }
        Expr::Range(lo, hi) => match (eval(lo, ctx)?, eval(hi, ctx)?) {
            (Value::Int(lo), Value::Int(hi)) => Ok(Value::Range(lo, hi)),
            (lo, hi) => Err(mismatch("..", &lo, &hi)),
        },
        Expr::Not(inner) => match eval(inner, ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ConditionError::TypeMismatch {
                op: "!",
                lhs: other.type_name(),
                rhs: "-",
            }),
        },
        Expr::Neg(inner) => match eval(inner, ctx)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ConditionError::Invalid("integer overflow".to_string())),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(ConditionError::TypeMismatch {
                op: "-",
                lhs: other.type_name(),
                rhs: "-",
            }),
        },
        Expr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, ctx),
    }
}

fn member<'a>(object: Value<'a>, field: &str, ctx: &ResponseContext<'a>) -> EvalResult<'a> {
    match object {
        Value::Response => match field {
            "status" => Ok(Value::Int(i64::from(ctx.status))),
            "time" => Ok(Value::Float(ctx.time_ms)),
            "body" => Ok(Value::Str(Cow::Borrowed(ctx.body))),
            "headers" => Ok(Value::Headers),
            "size" => Ok(Value::Int(ctx.size as i64)),
            _ => Err(ConditionError::UnknownField(format!("response.{field}"))),
        },
        Value::Headers => Ok(ctx
            .header(field)
            .map(|v| Value::Str(Cow::Borrowed(v)))
            .unwrap_or(Value::Nil)),
        other => Err(ConditionError::Invalid(format!(
            "cannot access field {field} on {}",
            other.type_name()
        ))),
    }
}

fn call<'a>(name: &str, args: Vec<Value<'a>>, ctx: &ResponseContext<'a>) -> EvalResult<'a> {
    let [arg] = <[Value<'a>; 1]>::try_from(args).map_err(|args| {
        ConditionError::Invalid(format!("{name}() takes 1 argument, got {}", args.len()))
    })?;

    match (name, arg) {
        ("len", Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        ("len", Value::List(items)) => Ok(Value::Int(items.len() as i64)),
        ("len", Value::Headers) => Ok(Value::Int(ctx.headers.len() as i64)),
        ("lower", Value::Str(s)) => Ok(Value::Str(Cow::Owned(s.to_lowercase()))),
        ("upper", Value::Str(s)) => Ok(Value::Str(Cow::Owned(s.to_uppercase()))),
        ("trim", Value::Str(s)) => Ok(Value::Str(Cow::Owned(s.trim().to_string()))),
        ("len" | "lower" | "upper" | "trim", other) => Err(ConditionError::Invalid(format!(
            "{name}() does not accept {}",
            other.type_name()
        ))),
        _ => Err(ConditionError::UnknownFunction(name.to_string())),
    }
}

fn binary<'a>(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &ResponseContext<'a>) -> EvalResult<'a> {
    // Connectives short-circuit, so the right side is evaluated lazily.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = expect_bool(op, eval(lhs, ctx)?)?;
        if (op == BinaryOp::And && !left) || (op == BinaryOp::Or && left) {
            return Ok(Value::Bool(left));
        }
        return expect_bool(op, eval(rhs, ctx)?).map(Value::Bool);
    }

    let left = eval(lhs, ctx)?;
    let right = eval(rhs, ctx)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| mismatch(op.symbol(), &left, &right))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::In => contains(&right, &left, ctx).map(Value::Bool),
        BinaryOp::NotIn => contains(&right, &left, ctx).map(|found| Value::Bool(!found)),
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Matches => {
            let (Value::Str(haystack), Value::Str(needle)) = (&left, &right) else {
                return Err(mismatch(op.symbol(), &left, &right));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Contains => haystack.contains(&**needle),
                BinaryOp::StartsWith => haystack.starts_with(&**needle),
                BinaryOp::EndsWith => haystack.ends_with(&**needle),
                _ => regex::Regex::new(needle)?.is_match(haystack),
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn expect_bool(op: BinaryOp, value: Value<'_>) -> Result<bool, ConditionError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ConditionError::TypeMismatch {
            op: op.symbol(),
            lhs: other.type_name(),
            rhs: "bool",
        }),
    }
}

fn equal(left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal(x, y))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn compare(left: &Value<'_>, right: &Value<'_>) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn contains(
    container: &Value<'_>,
    item: &Value<'_>,
    ctx: &ResponseContext<'_>,
) -> Result<bool, ConditionError> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.iter().any(|candidate| equal(candidate, item))),
        (Value::Range(lo, hi), _) => match item.as_f64() {
            Some(n) => Ok(n >= *lo as f64 && n <= *hi as f64),
            None => Err(mismatch("in", item, container)),
        },
        (Value::Headers, Value::Str(name)) => Ok(ctx.header(name).is_some()),
        _ => Err(mismatch("in", item, container)),
    }
}

fn arithmetic<'a>(op: BinaryOp, left: Value<'a>, right: Value<'a>) -> EvalResult<'a> {
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Rem if b == 0 => {
                return Err(ConditionError::Invalid("modulo by zero".to_string()));
            }
            BinaryOp::Rem => a.checked_rem(b),
            // `/` always yields a float.
            _ => {
                return divide(a as f64, b as f64);
            }
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| ConditionError::Invalid("integer overflow".to_string()));
    }

    if op == BinaryOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            return Ok(Value::Str(Cow::Owned(format!("{a}{b}"))));
        }
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(mismatch(op.symbol(), &left, &right));
    };
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div => divide(a, b),
        _ => Err(mismatch(op.symbol(), &left, &right)),
    }
}

fn divide<'a>(a: f64, b: f64) -> EvalResult<'a> {
    if b == 0.0 {
        return Err(ConditionError::Invalid("division by zero".to_string()));
    }
    Ok(Value::Float(a / b))
}

fn mismatch(op: &'static str, lhs: &Value<'_>, rhs: &Value<'_>) -> ConditionError {
    ConditionError::TypeMismatch {
        op,
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}
