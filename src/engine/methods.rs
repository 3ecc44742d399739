//! Methods on strings, lists, maps, modules and session handles

use crate::context::OutputSink;
use crate::engine::builtins::{arity, expect_str};
use crate::engine::error::{ErrorKind, ScriptError};
use crate::engine::value::Value;
use crate::session::{SessionRef, Verb};

/// Invoke `receiver.name(args)`. List methods mutate the receiver in place.
pub fn call_method(
    receiver: &mut Value,
    name: &str,
    args: Vec<Value>,
    sink: &mut OutputSink,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) => list_method(items, name, args),
        Value::Map(map) => map_method(map, name, args),
        Value::Session(handle) => session_method(handle, name, args),
        Value::Module(module) => match module.member(name) {
            Some(Value::Builtin(builtin)) => (builtin.func)(sink, args),
            Some(other) => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
            None => Err(ScriptError::new(
                ErrorKind::AttributeError,
                format!("module '{}' has no attribute '{}'", module.name, name),
            )),
        },
        other => Err(no_attribute(other, name)),
    }
}

/// Read `value.name` without calling it
pub fn get_attribute(value: &Value, name: &str) -> Result<Value, ScriptError> {
    match value {
        Value::Module(module) => module
            .member(name)
            .cloned()
            .ok_or_else(|| no_attribute(value, name)),
        Value::Type(type_name) if name == "name" => Ok(Value::from(*type_name)),
        other => Err(no_attribute(other, name)),
    }
}

fn no_attribute(value: &Value, name: &str) -> ScriptError {
    let message = match value {
        Value::Module(module) => format!("module '{}' has no attribute '{}'", module.name, name),
        other => format!("'{}' object has no attribute '{}'", other.type_name(), name),
    };
    ScriptError::new(ErrorKind::AttributeError, message)
}

fn str_method(s: &str, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "upper" => {
            arity("upper", &args, 0, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            arity("lower", &args, 0, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "trim" => {
            arity("trim", &args, 0, 0)?;
            Ok(Value::from(s.trim()))
        }
        "split" => {
            arity("split", &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = expect_str("split", sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::value_error("empty separator"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Ok(Value::List(parts))
        }
        "replace" => {
            arity("replace", &args, 2, 2)?;
            let from = expect_str("replace", &args[0])?;
            let to = expect_str("replace", &args[1])?;
            Ok(Value::Str(s.replace(from, to)))
        }
        "contains" => {
            arity("contains", &args, 1, 1)?;
            Ok(Value::Bool(s.contains(expect_str("contains", &args[0])?)))
        }
        "starts_with" => {
            arity("starts_with", &args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(expect_str("starts_with", &args[0])?)))
        }
        "ends_with" => {
            arity("ends_with", &args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(expect_str("ends_with", &args[0])?)))
        }
        _ => Err(no_attribute(&Value::Str(String::new()), name)),
    }
}

fn list_method(items: &mut Vec<Value>, name: &str, mut args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "append" => {
            arity("append", &args, 1, 1)?;
            items.extend(args.pop());
            Ok(Value::None)
        }
        "pop" => {
            arity("pop", &args, 0, 1)?;
            if items.is_empty() {
                return Err(ScriptError::new(ErrorKind::IndexError, "pop from empty list"));
            }
            let index = match args.first() {
                None => items.len() - 1,
                Some(Value::Int(i)) => normalize_index(*i, items.len())
                    .ok_or_else(|| ScriptError::new(ErrorKind::IndexError, "pop index out of range"))?,
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "list indices must be integers, not '{}'",
                        other.type_name()
                    )))
                }
            };
            Ok(items.remove(index))
        }
        "contains" => {
            arity("contains", &args, 1, 1)?;
            Ok(Value::Bool(items.contains(&args[0])))
        }
        _ => Err(no_attribute(&Value::List(Vec::new()), name)),
    }
}

fn map_method(
    map: &mut std::collections::BTreeMap<String, Value>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match name {
        "keys" => {
            arity("keys", &args, 0, 0)?;
            Ok(Value::List(map.keys().cloned().map(Value::Str).collect()))
        }
        "values" => {
            arity("values", &args, 0, 0)?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        "get" => {
            arity("get", &args, 1, 2)?;
            let key = expect_str("get", &args[0])?;
            Ok(map
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "contains" => {
            arity("contains", &args, 1, 1)?;
            Ok(Value::Bool(map.contains_key(expect_str("contains", &args[0])?)))
        }
        _ => Err(no_attribute(&Value::Map(Default::default()), name)),
    }
}

fn session_method(handle: &SessionRef, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let session_error = |err: crate::session::SessionError| {
        ScriptError::new(ErrorKind::SessionError, err.to_string())
    };

    match name {
        "get" => {
            arity("get", &args, 1, 1)?;
            let tag = expect_str("get", &args[0])?;
            handle
                .request(Verb::Get, &[tag])
                .map(Value::Str)
                .map_err(session_error)
        }
        "set" => {
            arity("set", &args, 2, 2)?;
            let tag = expect_str("set", &args[0])?;
            let value = args[1].render()?;
            handle
                .request(Verb::Set, &[tag, value.as_str()])
                .map(|_| Value::None)
                .map_err(session_error)
        }
        "cmd" => {
            arity("cmd", &args, 1, 1)?;
            let command = expect_str("cmd", &args[0])?;
            handle
                .request(Verb::Cmd, &[command])
                .map(Value::Str)
                .map_err(session_error)
        }
        "endpoint" => {
            arity("endpoint", &args, 0, 0)?;
            handle.probe().map_err(session_error)?;
            Ok(Value::Str(handle.endpoint()))
        }
        _ => Err(ScriptError::new(
            ErrorKind::AttributeError,
            format!("'Session' object has no attribute '{}'", name),
        )),
    }
}

/// Python-style index: negative values count from the end
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}
