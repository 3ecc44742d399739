//! Execution engine for cell scripts
//!
//! The context talks to the engine only through [`Evaluator`], so another
//! language can be plugged in without touching the context or the kernel.

pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod methods;
pub mod modules;
pub mod value;

use tracing::debug;

use crate::context::{Bindings, OutputSink};
use crate::parser::parse_program;
use crate::script::validator::{validate_program, ValidationOptions, ValidationSeverity};

pub use error::{ErrorKind, ScriptError};
pub use interpreter::Interpreter;
pub use value::{RenderError, Value};

/// Runs source text against a mutable scope
pub trait Evaluator: Send + Sync {
    /// Execute `source`. Output goes to `sink`; bindings made before a
    /// failure stay in `scope`.
    fn evaluate(&self, source: &str, scope: &mut Bindings, sink: &mut OutputSink) -> Result<(), ScriptError>;
}

/// The cell-script evaluator: parse, validate, interpret
#[derive(Debug, Clone, Default)]
pub struct ScriptEvaluator {
    options: ValidationOptions,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ValidationOptions) -> Self {
        Self { options }
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, source: &str, scope: &mut Bindings, sink: &mut OutputSink) -> Result<(), ScriptError> {
        let program = parse_program(source)?;

        let issues = validate_program(&program, &self.options);
        if let Some(issue) = issues
            .iter()
            .find(|issue| issue.severity == ValidationSeverity::Error)
        {
            return Err(ScriptError::new(ErrorKind::SyntaxError, issue.message.clone()));
        }

        debug!(statements = program.statements.len(), "evaluating cell");
        Interpreter::new(scope, sink).run(&program)
    }
}
