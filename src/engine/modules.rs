//! Library namespaces: `math`, `json` and `time`

use std::sync::Arc;
use std::time::Duration;

use crate::context::OutputSink;
use crate::engine::builtins::{arity, expect_number, expect_str, float_to_int};
use crate::engine::error::{ErrorKind, ScriptError};
use crate::engine::value::{Module, Value};

/// Fresh instances of every library module, keyed by binding name
pub fn library() -> Vec<(&'static str, Value)> {
    vec![
        ("math", Value::Module(Arc::new(math()))),
        ("json", Value::Module(Arc::new(json()))),
        ("time", Value::Module(Arc::new(time()))),
    ]
}

fn math() -> Module {
    Module::new("math")
        .function("sqrt", sqrt)
        .function("floor", floor)
        .function("ceil", ceil)
        .function("pow", pow)
        .function("log", log)
        .function("exp", exp)
        .function("sin", sin)
        .function("cos", cos)
        .constant("pi", Value::Float(std::f64::consts::PI))
        .constant("e", Value::Float(std::f64::consts::E))
}

fn json() -> Module {
    Module::new("json")
        .function("dumps", dumps)
        .function("loads", loads)
}

fn time() -> Module {
    Module::new("time").function("now", now).function("sleep", sleep)
}

fn domain_error() -> ScriptError {
    ScriptError::value_error("math domain error")
}

fn range_checked(result: f64) -> Result<Value, ScriptError> {
    if result.is_infinite() {
        return Err(ScriptError::new(ErrorKind::OverflowError, "math range error"));
    }
    Ok(Value::Float(result))
}

fn sqrt(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("sqrt", &args, 1, 1)?;
    let x = expect_number("sqrt", &args[0])?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.sqrt()))
}

fn floor(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("floor", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        other => float_to_int(expect_number("floor", other)?.floor()).map(Value::Int),
    }
}

fn ceil(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("ceil", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        other => float_to_int(expect_number("ceil", other)?.ceil()).map(Value::Int),
    }
}

fn pow(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("pow", &args, 2, 2)?;
    let base = expect_number("pow", &args[0])?;
    let exponent = expect_number("pow", &args[1])?;
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(domain_error());
    }
    range_checked(base.powf(exponent))
}

fn log(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("log", &args, 1, 2)?;
    let x = expect_number("log", &args[0])?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        None => Ok(Value::Float(x.ln())),
        Some(base) => {
            let base = expect_number("log", base)?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
    }
}

fn exp(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("exp", &args, 1, 1)?;
    range_checked(expect_number("exp", &args[0])?.exp())
}

fn sin(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("sin", &args, 1, 1)?;
    Ok(Value::Float(expect_number("sin", &args[0])?.sin()))
}

fn cos(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("cos", &args, 1, 1)?;
    Ok(Value::Float(expect_number("cos", &args[0])?.cos()))
}

fn dumps(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("dumps", &args, 1, 1)?;
    let json = args[0].to_json()?;
    serde_json::to_string(&json)
        .map(Value::Str)
        .map_err(|e| ScriptError::value_error(e.to_string()))
}

fn loads(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("loads", &args, 1, 1)?;
    let text = expect_str("loads", &args[0])?;
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ScriptError::value_error(format!("invalid JSON: {}", e)))?;
    Ok(Value::from_json(&json))
}

/// Seconds since the Unix epoch
fn now(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("now", &args, 0, 0)?;
    let micros = chrono::Utc::now().timestamp_micros();
    Ok(Value::Float(micros as f64 / 1_000_000.0))
}

fn sleep(_: &mut OutputSink, args: Vec<Value>) -> Result<Value, ScriptError> {
    arity("sleep", &args, 1, 1)?;
    let seconds = expect_number("sleep", &args[0])?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ScriptError::value_error("sleep length must be a non-negative number"));
    }
    let length = Duration::try_from_secs_f64(seconds)
        .map_err(|_| ScriptError::new(ErrorKind::OverflowError, "sleep length is too large"))?;
    std::thread::sleep(length);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::methods::{call_method, get_attribute};

    fn module(name: &str) -> Value {
        library()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .unwrap()
    }

    fn call(module_name: &str, func: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let mut receiver = module(module_name);
        call_method(&mut receiver, func, args, &mut OutputSink::default())
    }

    #[test]
    fn test_math() {
        assert_eq!(call("math", "sqrt", vec![Value::Int(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(call("math", "floor", vec![Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        assert_eq!(call("math", "ceil", vec![Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert_eq!(
            call("math", "log", vec![Value::Int(8), Value::Int(2)]).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            call("math", "sqrt", vec![Value::Int(-1)]).unwrap_err().kind,
            ErrorKind::ValueError
        );
        assert_eq!(
            call("math", "exp", vec![Value::Int(1000)]).unwrap_err().kind,
            ErrorKind::OverflowError
        );
    }

    #[test]
    fn test_math_constants() {
        let math = module("math");
        assert_eq!(
            get_attribute(&math, "pi").unwrap(),
            Value::Float(std::f64::consts::PI)
        );
        let err = get_attribute(&math, "tau").unwrap_err();
        assert_eq!(err.message, "module 'math' has no attribute 'tau'");
    }

    #[test]
    fn test_json_dumps_and_loads() {
        let loaded = call("json", "loads", vec![Value::from(r#"{"a": [1, 2]}"#)]).unwrap();
        let dumped = call("json", "dumps", vec![loaded]).unwrap();
        assert_eq!(dumped, Value::from(r#"{"a":[1,2]}"#));

        let err = call("json", "loads", vec![Value::from("{oops")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }

    #[test]
    fn test_time() {
        match call("time", "now", vec![]).unwrap() {
            Value::Float(t) => assert!(t > 1_600_000_000.0),
            other => panic!("Expected float, got {:?}", other),
        }
        assert_eq!(call("time", "sleep", vec![Value::Int(0)]).unwrap(), Value::None);
        assert!(call("time", "sleep", vec![Value::Int(-1)]).is_err());
        assert_eq!(
            call("time", "sleep", vec![Value::Float(1e300)]).unwrap_err().kind,
            ErrorKind::OverflowError
        );
    }
}
