//! Script support: static validation and file runner
//!
//! Validation is shared with the engine, which rejects cells carrying
//! validation errors before they execute.

pub mod runner;
pub mod validator;

pub use runner::{explain_script, explain_source, infer_kind, ScriptRunner};
pub use validator::{
    has_errors, has_warnings, validate_program, ScriptValidationError, ValidationOptions,
    ValidationSeverity,
};
