//! Runtime values of the cell-script language

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use crate::context::OutputSink;
use crate::engine::error::{ErrorKind, ScriptError};
use crate::parser::FunctionDef;
use crate::session::{SessionError, SessionRef};

/// Signature shared by builtins and library module functions
pub type BuiltinFn = fn(&mut OutputSink, Vec<Value>) -> Result<Value, ScriptError>;

/// A native function exposed to scripts
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// A library namespace such as `math`
#[derive(Debug)]
pub struct Module {
    pub name: &'static str,
    members: BTreeMap<&'static str, Value>,
}

impl Module {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: BTreeMap::new(),
        }
    }

    pub fn function(mut self, name: &'static str, func: BuiltinFn) -> Self {
        self.members.insert(name, Value::Builtin(Builtin { name, func }));
        self
    }

    pub fn constant(mut self, name: &'static str, value: Value) -> Self {
        self.members.insert(name, value);
        self
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }
}

/// Raised when a value has no string form, e.g. a session handle that was closed
#[derive(Error, Debug)]
#[error("cannot render value: {0}")]
pub struct RenderError(#[from] pub SessionError);

impl From<RenderError> for ScriptError {
    fn from(err: RenderError) -> Self {
        ScriptError::new(ErrorKind::SessionError, err.0.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(Arc<FunctionDef>),
    Builtin(Builtin),
    Module(Arc<Module>),
    /// A type object; only `Session` exists today
    Type(&'static str),
    Session(SessionRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Module(_) => "module",
            Value::Type(_) => "type",
            Value::Session(_) => "Session",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Value::Type(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by mixed int/float arithmetic
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form, as `print` and `str()` produce it
    pub fn render(&self) -> Result<String, RenderError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            other => other.repr(),
        }
    }

    /// Literal-like form; strings are quoted
    pub fn repr(&self) -> Result<String, RenderError> {
        let mut out = String::new();
        self.write_repr(&mut out)?;
        Ok(out)
    }

    fn write_repr(&self, out: &mut String) -> Result<(), RenderError> {
        match self {
            Value::None => out.push_str("none"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => {
                let _ = write!(out, "{:?}", s);
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out)?;
                }
                out.push(']');
            }
            Value::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{:?}: ", key);
                    value.write_repr(out)?;
                }
                out.push('}');
            }
            Value::Function(def) => {
                let _ = write!(out, "<fn {}>", def.name);
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<builtin {}>", b.name);
            }
            Value::Module(m) => {
                let _ = write!(out, "<module {}>", m.name);
            }
            Value::Type(name) => {
                let _ = write!(out, "<type {}>", name);
            }
            Value::Session(handle) => out.push_str(&handle.describe()?),
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ScriptError> {
        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    ScriptError::value_error(format!("{} is not valid JSON", format_float(*f)))
                })?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ScriptError>>()?,
            ),
            other => {
                return Err(ScriptError::type_error(format!(
                    "object of type '{}' is not JSON serializable",
                    other.type_name()
                )))
            }
        })
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Ordering used by comparisons, `min`, `max` and `sorted`
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Session(a), Value::Session(b)) => a.same_handle(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Whole floats keep a trailing `.0` so they read back as floats
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Connector, InMemoryConnector};

    #[test]
    fn test_render_scalars() {
        assert_eq!(Value::None.render().unwrap(), "none");
        assert_eq!(Value::Bool(true).render().unwrap(), "true");
        assert_eq!(Value::Int(-3).render().unwrap(), "-3");
        assert_eq!(Value::Float(2.0).render().unwrap(), "2.0");
        assert_eq!(Value::Float(0.5).render().unwrap(), "0.5");
        assert_eq!(Value::from("hi").render().unwrap(), "hi");
        assert_eq!(Value::from("hi").repr().unwrap(), "\"hi\"");
    }

    #[test]
    fn test_render_collections() {
        let list = Value::List(vec![Value::Int(1), Value::from("a"), Value::None]);
        assert_eq!(list.render().unwrap(), "[1, \"a\", none]");

        let mut map = BTreeMap::new();
        map.insert("b".to_string(), Value::Float(1.5));
        map.insert("a".to_string(), Value::List(vec![]));
        assert_eq!(Value::Map(map).render().unwrap(), "{\"a\": [], \"b\": 1.5}");
    }

    #[test]
    fn test_closed_session_does_not_render() {
        let connector = InMemoryConnector::new();
        let handle = SessionRef::new(connector.connect().unwrap());
        let value = Value::Session(handle.clone());
        assert_eq!(value.render().unwrap(), "Session(memory#1)");

        handle.close().unwrap();
        assert!(value.render().is_err());
        assert!(Value::List(vec![value]).render().is_err());
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_ne!(Value::from("1"), Value::Int(1));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::from("a")), None);
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": [1, 2.5, true, null], "b": "x"}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);

        assert!(Value::Float(f64::NAN).to_json().is_err());
        assert!(Value::Type("Session").to_json().is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::List(vec![Value::None]).is_truthy());
        assert!(Value::Type("Session").is_truthy());
    }
}
