//! Builtin functions available in every cell

use std::cmp::Ordering;

use crate::context::OutputSink;
use crate::engine::error::{ErrorKind, ScriptError};
use crate::engine::value::{format_float, Builtin, BuiltinFn, Value};

/// Largest list `range()` will build
pub const MAX_RANGE_LEN: i64 = 10_000_000;

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("print", print),
    ("eprint", eprint),
    ("len", len),
    ("str", to_str),
    ("int", to_int),
    ("float", to_float),
    ("bool", to_bool),
    ("type", type_of),
    ("range", range),
    ("abs", abs),
    ("min", min),
    ("max", max),
    ("sum", sum),
    ("round", round),
    ("sorted", sorted),
    ("keys", keys),
    ("format", format),
    ("fail", fail),
];

/// Find a builtin by name
pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(name, func)| Value::Builtin(Builtin { name: *name, func: *func }))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Check the argument count of a native call
pub(crate) fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() >= min && args.len() <= max {
        return Ok(());
    }
    let expected = if min == max {
        format!("{} argument{}", min, if min == 1 { "" } else { "s" })
    } else if max == usize::MAX {
        format!("at least {} argument{}", min, if min == 1 { "" } else { "s" })
    } else {
        format!("{} to {} arguments", min, max)
    };
    Err(ScriptError::type_error(format!(
        "{}() takes {} ({} given)",
        name,
        expected,
        args.len()
    )))
}

pub(crate) fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, ScriptError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::type_error(format!(
            "{}() expects a str, not '{}'",
            name,
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_number(name: &str, value: &Value) -> Result<f64, ScriptError> {
    value.as_f64().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{}() expects a number, not '{}'",
            name,
            value.type_name()
        ))
    })
}

/// Convert a float to an int, failing on NaN, infinity or out-of-range values
pub(crate) fn float_to_int(f: f64) -> Result<i64, ScriptError> {
    if f.is_nan() {
        return Err(ScriptError::value_error("cannot convert float NaN to integer"));
    }
    let truncated = f.trunc();
    if !f.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(ScriptError::new(
            ErrorKind::OverflowError,
            format!("cannot convert float {} to integer", format_float(f)),
        ));
    }
    Ok(truncated as i64)
}

fn render_args(args: &[Value]) -> Result<String, ScriptError> {
    let parts = args
        .iter()
        .map(|v| v.render())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(" "))
}

fn print(sink: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    let line = render_args(&args)?;
    sink.write_out(&line);
    sink.write_out("\n");
    Ok(Value::None)
}

fn eprint(sink: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    let line = render_args(&args)?;
    sink.write_err(&line);
    sink.write_err("\n");
    Ok(Value::None)
}

fn len(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("len", &args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(ScriptError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn to_str(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("str", &args, 0, 1)?;
    match args.first() {
        Some(value) => Ok(Value::Str(value.render()?)),
        None => Ok(Value::Str(String::new())),
    }
}

fn to_int(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("int", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::value_error(format!("invalid literal for int(): '{}'", s))
        }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a str or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("float", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ScriptError::value_error(format!("could not convert string to float: '{}'", s))
        }),
        other => Err(ScriptError::type_error(format!(
            "float() argument must be a str or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_bool(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("bool", &args, 0, 1)?;
    Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)))
}

fn type_of(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("type", &args, 1, 1)?;
    Ok(Value::from(args[0].type_name()))
}

fn range(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("range", &args, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| match v {
            Value::Int(n) => Ok(*n),
            other => Err(ScriptError::type_error(format!(
                "range() arguments must be int, not '{}'",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => return Err(ScriptError::type_error("range() expects at least 1 argument")),
    };
    if step == 0 {
        return Err(ScriptError::value_error("range() step must not be zero"));
    }

    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let count = (span + step.unsigned_abs() as i128 - 1) / step.unsigned_abs() as i128;
    if count > MAX_RANGE_LEN as i128 {
        return Err(ScriptError::value_error(format!(
            "range() of {} elements is too large",
            count
        )));
    }

    let items = (0..count as i64)
        .map(|i| Value::Int(start + i * step))
        .collect();
    Ok(Value::List(items))
}

fn abs(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("abs", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(ScriptError::overflow),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ScriptError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// `min`/`max` accept either one list or several arguments
fn extremum(name: &str, args: Vec<Value>, wanted: Ordering) -> Result<Value, ScriptError> {
    arity(name, &args, 1, usize::MAX)?;
    let items = match args.as_slice() {
        [Value::List(items)] => items.clone(),
        _ => args,
    };

    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| ScriptError::value_error(format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        let ordering = item.compare(&best).ok_or_else(|| {
            ScriptError::type_error(format!(
                "'{}' not supported between '{}' and '{}'",
                name,
                item.type_name(),
                best.type_name()
            ))
        })?;
        if ordering == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn min(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    extremum("min", args, Ordering::Less)
}

fn max(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    extremum("max", args, Ordering::Greater)
}

fn sum(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("sum", &args, 1, 2)?;
    let items = match &args[0] {
        Value::List(items) => items,
        other => {
            return Err(ScriptError::type_error(format!(
                "sum() expects a list, not '{}'",
                other.type_name()
            )))
        }
    };

    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    for item in items {
        total = match (&total, item) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_add(*b).ok_or_else(ScriptError::overflow)?)
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Value::Float(x + y),
                _ => {
                    return Err(ScriptError::type_error(format!(
                        "unsupported operand type(s) for +: '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    )))
                }
            },
        };
    }
    Ok(total)
}

fn round(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("round", &args, 1, 2)?;
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(Value::Int(n)) => Some(*n),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "round() digits must be int, not '{}'",
                other.type_name()
            )))
        }
    };

    match (&args[0], digits) {
        (Value::Int(n), _) => Ok(Value::Int(*n)),
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(d)) => {
            let scale = 10f64.powi(d.clamp(-308, 308) as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(ScriptError::type_error(format!(
            "round() expects a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn sorted(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("sorted", &args, 1, 1)?;
    let mut items = match args.into_iter().next() {
        Some(Value::List(items)) => items,
        Some(Value::Map(map)) => map.into_keys().map(Value::Str).collect(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "'{}' object is not sortable",
                other.type_name()
            )))
        }
        None => Vec::new(),
    };

    let mut failure = None;
    items.sort_by(|a, b| match a.compare(b) {
        Some(ordering) => ordering,
        None => {
            failure.get_or_insert_with(|| {
                ScriptError::type_error(format!(
                    "'<' not supported between '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))
            });
            Ordering::Equal
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(Value::List(items)),
    }
}

fn keys(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("keys", &args, 1, 1)?;
    match &args[0] {
        Value::Map(map) => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
        other => Err(ScriptError::type_error(format!(
            "keys() expects a map, not '{}'",
            other.type_name()
        ))),
    }
}

/// `format("{} of {}", a, b)`; `{{` and `}}` are literal braces
fn format(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("format", &args, 1, usize::MAX)?;
    let template = expect_str("format", &args[0])?;
    let mut values = args[1..].iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                out.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                let value = values.next().ok_or_else(|| {
                    ScriptError::new(ErrorKind::IndexError, "format() has more placeholders than arguments")
                })?;
                out.push_str(&value.render()?);
            }
            _ => out.push(c),
        }
    }
    Ok(Value::Str(out))
}

fn fail(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    let message = render_args(&args)?;
    Err(ScriptError::new(ErrorKind::RuntimeError, message))
}
