use serde_json::Value as Json;

use crate::ast::{BinaryOp, Expr, Literal};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::Collection;

/// Evaluate `expr` with `focus` as the current contextual collection (`$this`).
pub fn eval(expr: &Expr, focus: &Collection, ctx: &Context) -> Result<Collection> {
    match expr {
        Expr::Literal(Literal::Boolean(b)) => Ok(Collection::boolean(*b)),
        Expr::Literal(Literal::Number(n)) => {
            let num: Json = if n.contains('.') {
                serde_json::Number::from_f64(n.parse().unwrap_or(0.0))
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            } else {
                Json::Number(n.parse::<i64>().unwrap_or(0).into())
            };
            Ok(Collection::single(num))
        }
        Expr::Literal(Literal::String(s)) => Ok(Collection::single(Json::String(s.clone()))),
        Expr::Variable(name) if name == "this" => Ok(focus.clone()),
        Expr::Variable(_) => Ok(Collection::empty()),
        Expr::EnvVariable(name) if name == "resource" || name == "context" => {
            Ok(Collection::single(ctx.resource.clone()))
        }
        Expr::EnvVariable(name) => Ok(ctx
            .env
            .get(name)
            .cloned()
            .map(Collection::single)
            .unwrap_or_default()),
        Expr::Member(name) => Ok(navigate(focus, name)),
        Expr::Function(name, args) => call_function(name, args, focus, ctx),
        Expr::Invoke(lhs, rhs) => {
            let mid = eval(lhs, focus, ctx)?;
            eval(rhs, &mid, ctx)
        }
        Expr::Negate(inner) => {
            let v = eval(inner, focus, ctx)?;
            Ok(Collection(
                v.iter()
                    .filter_map(|j| j.as_f64().map(|n| json_number(-n)))
                    .collect(),
            ))
        }
        Expr::Union(lhs, rhs) => {
            let mut l = eval(lhs, focus, ctx)?;
            let r = eval(rhs, focus, ctx)?;
            l.extend(r);
            Ok(l)
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, focus, ctx),
    }
}

fn navigate(focus: &Collection, name: &str) -> Collection {
    let mut out = Vec::new();
    for item in focus.iter() {
        match item {
            Json::Object(map) => {
                if let Some(v) = map.get(name) {
                    collect_value(v, &mut out);
                } else {
                    // choice-type projection: `value` matches `valueString`, `valueBoolean`, ...
                    if name == "value" || name == "effective" || name == "onset" {
                        let prefix = name;
                        for (k, v) in map.iter() {
                            if k.len() > prefix.len()
                                && k.starts_with(prefix)
                                && k.as_bytes()[prefix.len()].is_ascii_uppercase()
                            {
                                collect_value(v, &mut out);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Collection(out)
}

fn collect_value(v: &Json, out: &mut Vec<Json>) {
    match v {
        Json::Array(items) => {
            for item in items {
                if !item.is_null() {
                    out.push(item.clone());
                }
            }
        }
        Json::Null => {}
        other => out.push(other.clone()),
    }
}

fn json_number(n: f64) -> Json {
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

fn call_function(name: &str, args: &[Expr], focus: &Collection, ctx: &Context) -> Result<Collection> {
    match name {
        "exists" => {
            if args.is_empty() {
                Ok(Collection::boolean(!focus.is_empty()))
            } else {
                check_arity(name, args, 1)?;
                let any = focus
                    .iter()
                    .map(|item| eval(&args[0], &Collection::single(item.clone()), ctx))
                    .collect::<Result<Vec<_>>>()?
                    .iter()
                    .any(|c| c.to_boolean());
                Ok(Collection::boolean(any))
            }
        }
        "empty" => {
            check_arity(name, args, 0)?;
            Ok(Collection::boolean(focus.is_empty()))
        }
        "not" => {
            check_arity(name, args, 0)?;
            Ok(Collection::boolean(!focus.to_boolean()))
        }
        "all" => {
            check_arity(name, args, 1)?;
            let all_match = focus
                .iter()
                .map(|item| eval(&args[0], &Collection::single(item.clone()), ctx))
                .collect::<Result<Vec<_>>>()?
                .iter()
                .all(|c| c.to_boolean());
            Ok(Collection::boolean(all_match))
        }
        "where" => {
            check_arity(name, args, 1)?;
            let mut out = Vec::new();
            for item in focus.iter() {
                let kept = eval(&args[0], &Collection::single(item.clone()), ctx)?;
                if kept.to_boolean() {
                    out.push(item.clone());
                }
            }
            Ok(Collection(out))
        }
        "select" => {
            check_arity(name, args, 1)?;
            let mut out = Collection::empty();
            for item in focus.iter() {
                out.extend(eval(&args[0], &Collection::single(item.clone()), ctx)?);
            }
            Ok(out)
        }
        "count" => {
            check_arity(name, args, 0)?;
            Ok(Collection::single(Json::Number(focus.len().into())))
        }
        "first" => {
            check_arity(name, args, 0)?;
            Ok(focus
                .iter()
                .next()
                .cloned()
                .map(Collection::single)
                .unwrap_or_default())
        }
        "last" => {
            check_arity(name, args, 0)?;
            Ok(focus
                .iter()
                .last()
                .cloned()
                .map(Collection::single)
                .unwrap_or_default())
        }
        "single" => {
            check_arity(name, args, 0)?;
            if focus.len() == 1 {
                Ok(focus.clone())
            } else {
                Ok(Collection::empty())
            }
        }
        "ofType" => {
            check_arity(name, args, 1)?;
            let type_name = match &args[0] {
                Expr::Member(n) => n.clone(),
                _ => return Err(Error::Evaluation("ofType expects a type identifier".into())),
            };
            let filtered = focus
                .iter()
                .filter(|item| {
                    item.get("resourceType")
                        .and_then(Json::as_str)
                        .map(|rt| rt == type_name)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            Ok(Collection(filtered))
        }
        "extension" => {
            check_arity(name, args, 1)?;
            let url = eval(&args[0], focus, ctx)?;
            let Some(Json::String(url)) = url.iter().next().cloned() else {
                return Ok(Collection::empty());
            };
            let mut out = Vec::new();
            for item in focus.iter() {
                if let Some(Json::Array(exts)) = item.get("extension") {
                    for ext in exts {
                        if ext.get("url").and_then(Json::as_str) == Some(url.as_str()) {
                            out.push(ext.clone());
                        }
                    }
                }
            }
            Ok(Collection(out))
        }
        "trace" => {
            // trace(name[, projection]) — diagnostic no-op, passes the input collection through.
            Ok(focus.clone())
        }
        "iif" => {
            check_arity(name, args, 3)?;
            let cond = eval(&args[0], focus, ctx)?;
            if cond.to_boolean() {
                eval(&args[1], focus, ctx)
            } else {
                eval(&args[2], focus, ctx)
            }
        }
        "length" => {
            check_arity(name, args, 0)?;
            let lens: Vec<Json> = focus
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| Json::Number(s.chars().count().into()))
                .collect();
            Ok(Collection(lens))
        }
        "matches" => {
            check_arity(name, args, 1)?;
            let pattern = eval(&args[0], focus, ctx)?;
            let Some(Json::String(pattern)) = pattern.iter().next().cloned() else {
                return Ok(Collection::empty());
            };
            // Minimal engine: no regex dependency here; defer to exact prefix/substring
            // semantics is wrong in general, so treat unsupported patterns conservatively
            // as non-matching rather than silently succeeding.
            let _ = pattern;
            Ok(Collection::boolean(false))
        }
        "startsWith" => {
            check_arity(name, args, 1)?;
            let prefix = eval(&args[0], focus, ctx)?;
            let Some(Json::String(prefix)) = prefix.iter().next().cloned() else {
                return Ok(Collection::empty());
            };
            let ok = focus
                .iter()
                .filter_map(|v| v.as_str())
                .all(|s| s.starts_with(prefix.as_str()));
            Ok(Collection::boolean(ok))
        }
        "hasValue" => {
            check_arity(name, args, 0)?;
            Ok(Collection::boolean(!focus.is_empty()))
        }
        other => Err(Error::UnknownFunction(other.to_string())),
    }
}

fn check_arity(name: &str, args: &[Expr], expected: usize) -> Result<()> {
    if args.len() != expected {
        Err(Error::ArityMismatch(name.to_string(), expected, args.len()))
    } else {
        Ok(())
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    focus: &Collection,
    ctx: &Context,
) -> Result<Collection> {
    use BinaryOp::*;
    match op {
        And | Or | Xor | Implies => {
            let l = eval(lhs, focus, ctx)?.to_boolean_opt();
            let r = eval(rhs, focus, ctx)?.to_boolean_opt();
            let result = match op {
                And => match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                Or => match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
                Xor => match (l, r) {
                    (Some(a), Some(b)) => Some(a != b),
                    _ => None,
                },
                Implies => match l {
                    Some(false) => Some(true),
                    Some(true) => r,
                    None => match r {
                        Some(true) => Some(true),
                        _ => None,
                    },
                },
                _ => unreachable!(),
            };
            Ok(match result {
                Some(b) => Collection::boolean(b),
                None => Collection::empty(),
            })
        }
        Eq | Ne => {
            let l = eval(lhs, focus, ctx)?;
            let r = eval(rhs, focus, ctx)?;
            if l.is_empty() || r.is_empty() {
                return Ok(Collection::empty());
            }
            let eq = collections_equal(&l, &r);
            Ok(Collection::boolean(if op == Eq { eq } else { !eq }))
        }
        Lt | Le | Gt | Ge => {
            let l = eval(lhs, focus, ctx)?;
            let r = eval(rhs, focus, ctx)?;
            let (Some(a), Some(b)) = (singleton(&l), singleton(&r)) else {
                return Ok(Collection::empty());
            };
            let ordering = compare_json(a, b);
            let Some(ordering) = ordering else {
                return Ok(Collection::empty());
            };
            let result = match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Collection::boolean(result))
        }
        Add | Sub | Mul | Div => {
            let l = eval(lhs, focus, ctx)?;
            let r = eval(rhs, focus, ctx)?;
            let (Some(a), Some(b)) = (
                singleton(&l).and_then(Json::as_f64),
                singleton(&r).and_then(Json::as_f64),
            ) else {
                return Ok(Collection::empty());
            };
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => unreachable!(),
            };
            Ok(Collection::single(json_number(result)))
        }
    }
}

fn singleton(c: &Collection) -> Option<&Json> {
    if c.len() == 1 {
        c.iter().next()
    } else {
        None
    }
}

fn collections_equal(l: &Collection, r: &Collection) -> bool {
    if l.len() != r.len() {
        return false;
    }
    l.iter().zip(r.iter()).all(|(a, b)| json_eq(a, b))
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_json(a: &Json, b: &Json) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
