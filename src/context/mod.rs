//! Persistent execution context
//!
//! The context is the one namespace every cell runs against. It starts with
//! the reserved bindings (library modules and the `Session` type), keeps
//! whatever user code defines until it is deleted or the context is reset,
//! and carries the transient `srv` binding while a request holds a session.

mod bindings;
mod coerce;
mod reserved;
mod sink;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{ErrorKind, Evaluator, ScriptEvaluator, Value};
use crate::engine::modules::library;
use crate::session::SessionRef;

pub use bindings::Bindings;
pub use coerce::{validate_name, ConversionError, KindTag};
pub use reserved::{
    is_reserved, truncate_preview, LIBRARY_BINDINGS, PREVIEW_LIMIT, SESSION_BINDING,
    SESSION_TYPE_BINDING,
};
pub use sink::OutputSink;

/// How an evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvalStatus {
    Completed,
    Failed(ErrorKind),
}

impl EvalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, EvalStatus::Completed)
    }
}

/// Type and preview of one user binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    pub preview: String,
}

impl VariableInfo {
    fn unknown() -> Self {
        Self {
            type_name: "unknown".to_string(),
            preview: String::new(),
        }
    }
}

/// User bindings by name
pub type Snapshot = BTreeMap<String, VariableInfo>;

pub struct Context {
    bindings: Bindings,
    evaluator: Box<dyn Evaluator>,
}

impl Default for Context {
    fn default() -> Self {
        Self::with_evaluator(Box::new(ScriptEvaluator::new()))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl Context {
    /// Create a context holding only the reserved bindings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Box<dyn Evaluator>) -> Self {
        let mut context = Self {
            bindings: Bindings::default(),
            evaluator,
        };
        context.install_reserved();
        context
    }

    fn install_reserved(&mut self) {
        for (name, module) in library() {
            self.bindings.insert(name, module);
        }
        self.bindings
            .insert(SESSION_TYPE_BINDING, Value::Type(SESSION_TYPE_BINDING));
    }

    /// Run one cell. Errors never escape: they become one line on stderr.
    pub fn evaluate(&mut self, code: &str, sink: &mut OutputSink) -> EvalStatus {
        match self.evaluator.evaluate(code, &mut self.bindings, sink) {
            Ok(()) => EvalStatus::Completed,
            Err(err) => {
                debug!(kind = %err.kind, message = %err.message, "cell failed");
                sink.write_err(&err.to_line());
                EvalStatus::Failed(err.kind)
            }
        }
    }

    /// Run cells in order; the first failure stops the rest
    pub fn evaluate_sequence<S: AsRef<str>>(&mut self, cells: &[S], sink: &mut OutputSink) -> EvalStatus {
        for cell in cells {
            if let EvalStatus::Failed(kind) = self.evaluate(cell.as_ref(), sink) {
                return EvalStatus::Failed(kind);
            }
        }
        EvalStatus::Completed
    }

    /// Type and preview of every user binding, skipping callables and types
    pub fn snapshot(&self) -> Snapshot {
        self.bindings
            .user_bindings()
            .filter(|(_, value)| !value.is_callable() && !value.is_type())
            .map(|(name, value)| {
                let info = match value.render() {
                    Ok(text) => VariableInfo {
                        type_name: value.type_name().to_string(),
                        preview: truncate_preview(&text),
                    },
                    Err(err) => {
                        debug!(name, error = %err, "preview failed");
                        VariableInfo::unknown()
                    }
                };
                (name.to_string(), info)
            })
            .collect()
    }

    /// Bind `name` to `raw` converted to `kind`. On failure nothing changes.
    pub fn set_binding(&mut self, name: &str, raw: &str, kind: &str) -> Result<Value, ConversionError> {
        validate_name(name)?;
        let value = KindTag::parse(kind).coerce(raw)?;
        self.bindings.insert(name, value.clone());
        Ok(value)
    }

    /// Remove a user binding. Absent and reserved names are left alone.
    pub fn delete_binding(&mut self, name: &str) -> String {
        if !is_reserved(name) && self.bindings.remove(name).is_some() {
            debug!(name, "binding deleted");
        }
        name.to_string()
    }

    /// Drop every user binding and restore the reserved ones
    pub fn reset(&mut self) {
        let dropped = self.bindings.user_bindings().count();
        self.bindings = Bindings::default();
        self.install_reserved();
        info!(dropped, "context reset");
    }

    pub fn bind_session(&mut self, handle: SessionRef) {
        self.bindings.insert(SESSION_BINDING, Value::Session(handle));
    }

    pub fn unbind_session(&mut self) {
        self.bindings.remove(SESSION_BINDING);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Connector, InMemoryConnector};

    fn run(context: &mut Context, code: &str) -> (EvalStatus, OutputSink) {
        let mut sink = OutputSink::default();
        let status = context.evaluate(code, &mut sink);
        (status, sink)
    }

    #[test]
    fn test_new_context_has_only_reserved_bindings() {
        let context = Context::new();
        assert!(context.snapshot().is_empty());
        for name in ["math", "json", "time", "Session"] {
            assert!(context.get(name).is_some(), "{}", name);
        }
        assert!(context.get("srv").is_none());
    }

    #[test]
    fn test_bindings_persist_across_cells() {
        let mut context = Context::new();
        run(&mut context, "x = 10");
        let (status, sink) = run(&mut context, "print(x + 1)");
        assert_eq!(status, EvalStatus::Completed);
        assert_eq!(sink.stdout, "11\n");
    }

    #[test]
    fn test_error_writes_one_line_and_keeps_earlier_bindings() {
        let mut context = Context::new();
        let (status, sink) = run(&mut context, "a = 1\nprint(\"before\")\nb = missing\nc = 3");

        assert_eq!(status, EvalStatus::Failed(ErrorKind::NameError));
        assert_eq!(sink.stdout, "before\n");
        assert_eq!(sink.stderr, "NameError: name 'missing' is not defined\n");
        assert_eq!(sink.stderr.lines().count(), 1);
        assert_eq!(context.get("a"), Some(&Value::Int(1)));
        assert!(context.get("b").is_none());
        assert!(context.get("c").is_none());
    }

    #[test]
    fn test_sequence_stops_at_first_failure() {
        let mut context = Context::new();
        let mut sink = OutputSink::default();
        let status = context.evaluate_sequence(&["x = 1", "y = x + 1", "1/0", "z = 99"], &mut sink);

        assert_eq!(status, EvalStatus::Failed(ErrorKind::ZeroDivisionError));
        assert_eq!(sink.stderr, "ZeroDivisionError: division by zero\n");

        let snapshot = context.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(snapshot["x"].preview, "1");
        assert_eq!(snapshot["y"].preview, "2");
        assert!(context.get("z").is_none());
    }

    #[test]
    fn test_snapshot_excludes_callables_types_and_reserved() {
        let mut context = Context::new();
        run(&mut context, "fn f() { return 1 }\np = print\nt = Session\nn = 3");
        let snapshot = context.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["n"]);
        assert_eq!(
            snapshot["n"],
            VariableInfo {
                type_name: "int".to_string(),
                preview: "3".to_string()
            }
        );
    }

    #[test]
    fn test_snapshot_truncates_long_previews() {
        let mut context = Context::new();
        context.set_binding("long", &"x".repeat(200), "str").unwrap();
        context.set_binding("fits", &"y".repeat(80), "str").unwrap();

        let snapshot = context.snapshot();
        let preview = &snapshot["long"].preview;
        assert_eq!(preview.chars().count(), 80);
        assert_eq!(preview, &format!("{}...", "x".repeat(77)));
        assert_eq!(snapshot["fits"].preview, "y".repeat(80));
    }

    #[test]
    fn test_snapshot_reports_stale_session_as_unknown() {
        let mut context = Context::new();
        let connector = InMemoryConnector::new();
        let handle = SessionRef::new(connector.connect().unwrap());

        context.bind_session(handle.clone());
        run(&mut context, "kept = srv");
        context.unbind_session();

        assert_eq!(context.snapshot()["kept"].type_name, "Session");
        handle.close().unwrap();

        let snapshot = context.snapshot();
        assert_eq!(snapshot["kept"], VariableInfo::unknown());
        assert!(!snapshot.contains_key("srv"));
    }

    #[test]
    fn test_snapshot_serializes_type_field() {
        let mut context = Context::new();
        context.set_binding("n", "5", "int").unwrap();
        let json = serde_json::to_value(context.snapshot()).unwrap();
        assert_eq!(json, serde_json::json!({"n": {"type": "int", "preview": "5"}}));
    }

    #[test]
    fn test_set_binding_conversions() {
        let mut context = Context::new();
        assert_eq!(context.set_binding("b", "YES", "bool").unwrap(), Value::Bool(true));
        assert_eq!(context.get("b"), Some(&Value::Bool(true)));
        assert_eq!(context.set_binding("f", " 2.5 ", "float").unwrap(), Value::Float(2.5));
        assert_eq!(context.set_binding("s", "12", "unknown-kind").unwrap(), Value::from("12"));
    }

    #[test]
    fn test_set_binding_failure_leaves_mapping_untouched() {
        let mut context = Context::new();
        let err = context.set_binding("n", "abc", "int").unwrap_err();
        assert!(matches!(err, ConversionError::InvalidLiteral { .. }));
        assert!(context.get("n").is_none());

        context.set_binding("n", "1", "int").unwrap();
        assert!(context.set_binding("n", "oops", "int").is_err());
        assert_eq!(context.get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_set_binding_rejects_reserved_and_invalid_names() {
        let mut context = Context::new();
        assert!(matches!(
            context.set_binding("math", "1", "int"),
            Err(ConversionError::ReservedName(_))
        ));
        assert!(matches!(
            context.set_binding("two words", "1", "int"),
            Err(ConversionError::InvalidName(_))
        ));
        assert!(matches!(context.get("math"), Some(Value::Module(_))));
    }

    #[test]
    fn test_delete_binding() {
        let mut context = Context::new();
        context.set_binding("x", "1", "int").unwrap();

        assert_eq!(context.delete_binding("x"), "x");
        assert!(context.get("x").is_none());
        assert_eq!(context.delete_binding("x"), "x");
        assert_eq!(context.delete_binding("math"), "math");
        assert!(context.get("math").is_some());
    }

    #[test]
    fn test_set_then_delete_snapshot() {
        let mut context = Context::new();
        context.set_binding("a", "1", "int").unwrap();
        context.set_binding("b", "two", "str").unwrap();
        context.set_binding("a", "3", "float").unwrap();
        context.delete_binding("b");

        let snapshot = context.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["a"].type_name, "float");
        assert_eq!(snapshot["a"].preview, "3.0");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut context = Context::new();
        run(&mut context, "x = 1\nfn f() { return 2 }");
        context.bind_session(SessionRef::new(InMemoryConnector::new().connect().unwrap()));

        context.reset();
        let names: Vec<String> = context.bindings().names().map(String::from).collect();
        context.reset();
        let again: Vec<String> = context.bindings().names().map(String::from).collect();

        assert_eq!(names, again);
        assert_eq!(names, vec!["Session", "json", "math", "time"]);
        assert!(context.snapshot().is_empty());
    }

    #[test]
    fn test_library_modules_are_usable() {
        let mut context = Context::new();
        let (status, sink) = run(
            &mut context,
            "print(math.floor(2.7), json.dumps({\"a\": [1, 2]}), math.pi > 3)",
        );
        assert_eq!(status, EvalStatus::Completed);
        assert_eq!(sink.stdout, "2 {\"a\":[1,2]} true\n");
    }

    #[test]
    fn test_script_cannot_overwrite_reserved() {
        let mut context = Context::new();
        let (status, sink) = run(&mut context, "json = 5");
        assert_eq!(status, EvalStatus::Failed(ErrorKind::NameError));
        assert!(sink.stderr.starts_with("NameError: cannot assign to reserved name 'json'"));
        assert!(matches!(context.get("json"), Some(Value::Module(_))));
    }

    #[test]
    fn test_session_binding_reaches_scripts() {
        let mut context = Context::new();
        let connector = InMemoryConnector::new();
        context.bind_session(SessionRef::new(connector.connect().unwrap()));

        let (status, sink) = run(&mut context, "srv.set(\"Rate\", 3)\nprint(srv.get(\"Rate\"))");
        assert_eq!(status, EvalStatus::Completed);
        assert_eq!(sink.stdout, "3\n");
        assert_eq!(connector.tag("Rate").as_deref(), Some("3"));

        context.unbind_session();
        let (status, _) = run(&mut context, "srv.get(\"Rate\")");
        assert_eq!(status, EvalStatus::Failed(ErrorKind::NameError));
    }
}
