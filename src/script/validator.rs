//! Static checks for parsed cells
//!
//! Runs before a cell executes so that misplaced control flow is rejected
//! without side effects, and feeds warnings to `workcell explain`.

use crate::context::is_reserved;
use crate::parser::{Expr, Literal, Program, Stmt};

/// A problem found in a cell
#[derive(Debug, Clone)]
pub struct ScriptValidationError {
    /// 1-based index of the top-level statement the problem sits in
    pub statement: Option<usize>,
    pub message: String,
    pub severity: ValidationSeverity,
}

/// Severity level for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ScriptValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            ValidationSeverity::Error => "ERROR",
            ValidationSeverity::Warning => "WARNING",
        };
        if let Some(statement) = self.statement {
            write!(f, "{} (statement {}): {}", prefix, statement, self.message)
        } else {
            write!(f, "{}: {}", prefix, self.message)
        }
    }
}

/// Validation options
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Maximum nesting depth of blocks
    pub max_nesting_depth: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: 32,
        }
    }
}

#[derive(Clone, Copy)]
struct Scope {
    in_loop: bool,
    in_function: bool,
    depth: usize,
}

/// Validate a parsed cell
pub fn validate_program(program: &Program, options: &ValidationOptions) -> Vec<ScriptValidationError> {
    let mut errors = Vec::new();
    let scope = Scope {
        in_loop: false,
        in_function: false,
        depth: 0,
    };

    for (i, stmt) in program.statements.iter().enumerate() {
        validate_statement(stmt, options, &mut errors, i + 1, scope);
    }

    errors
}

fn validate_block(
    body: &[Stmt],
    options: &ValidationOptions,
    errors: &mut Vec<ScriptValidationError>,
    statement: usize,
    scope: Scope,
) {
    for stmt in body {
        validate_statement(stmt, options, errors, statement, scope);
    }
}

fn validate_statement(
    stmt: &Stmt,
    options: &ValidationOptions,
    errors: &mut Vec<ScriptValidationError>,
    statement: usize,
    scope: Scope,
) {
    let mut report = |message: String, severity| {
        errors.push(ScriptValidationError {
            statement: Some(statement),
            message,
            severity,
        })
    };

    if scope.depth > options.max_nesting_depth {
        report(
            format!("Maximum nesting depth ({}) exceeded", options.max_nesting_depth),
            ValidationSeverity::Error,
        );
        return;
    }

    let top_level = !scope.in_function;
    let nested = Scope {
        depth: scope.depth + 1,
        ..scope
    };

    match stmt {
        Stmt::Break if !scope.in_loop => {
            report("'break' outside loop".to_string(), ValidationSeverity::Error)
        }
        Stmt::Continue if !scope.in_loop => report(
            "'continue' not properly in loop".to_string(),
            ValidationSeverity::Error,
        ),
        Stmt::Return(_) if !scope.in_function => {
            report("'return' outside function".to_string(), ValidationSeverity::Error)
        }

        Stmt::Assign(assign) if top_level && is_reserved(&assign.target.name) => report(
            format!("assignment to reserved name '{}' will fail", assign.target.name),
            ValidationSeverity::Warning,
        ),

        Stmt::If(i) => {
            for (_, body) in &i.branches {
                validate_block(body, options, errors, statement, nested);
            }
            if let Some(else_body) = &i.else_body {
                validate_block(else_body, options, errors, statement, nested);
            }
        }

        Stmt::While(w) => {
            if is_constant_true(&w.condition) && !can_leave(&w.body) {
                report(
                    "'while true' loop has no break or return and will never finish".to_string(),
                    ValidationSeverity::Warning,
                );
            }
            let body_scope = Scope {
                in_loop: true,
                ..nested
            };
            validate_block(&w.body, options, errors, statement, body_scope);
        }

        Stmt::For(f) => {
            if top_level && is_reserved(&f.iterator_var) {
                report(
                    format!("loop variable '{}' is a reserved name", f.iterator_var),
                    ValidationSeverity::Warning,
                );
            }
            let body_scope = Scope {
                in_loop: true,
                ..nested
            };
            validate_block(&f.body, options, errors, statement, body_scope);
        }

        Stmt::FnDef(def) => {
            if top_level && is_reserved(&def.name) {
                report(
                    format!("function name '{}' is a reserved name", def.name),
                    ValidationSeverity::Warning,
                );
            }
            let body_scope = Scope {
                in_loop: false,
                in_function: true,
                depth: nested.depth,
            };
            validate_block(&def.body, options, errors, statement, body_scope);
        }

        _ => {}
    }
}

fn is_constant_true(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Literal::Bool(true)))
}

/// Whether a loop body contains a `break` for this loop or any `return`
fn can_leave(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Break | Stmt::Return(_) => true,
        Stmt::If(i) => {
            i.branches.iter().any(|(_, b)| can_leave(b))
                || i.else_body.as_deref().is_some_and(can_leave)
        }
        Stmt::While(w) => contains_return(&w.body),
        Stmt::For(f) => contains_return(&f.body),
        _ => false,
    })
}

fn contains_return(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Return(_) => true,
        Stmt::If(i) => {
            i.branches.iter().any(|(_, b)| contains_return(b))
                || i.else_body.as_deref().is_some_and(contains_return)
        }
        Stmt::While(w) => contains_return(&w.body),
        Stmt::For(f) => contains_return(&f.body),
        _ => false,
    })
}

/// Check if a script has any validation errors (not just warnings)
pub fn has_errors(errors: &[ScriptValidationError]) -> bool {
    errors
        .iter()
        .any(|e| e.severity == ValidationSeverity::Error)
}

/// Check if a script has any validation warnings
pub fn has_warnings(errors: &[ScriptValidationError]) -> bool {
    errors
        .iter()
        .any(|e| e.severity == ValidationSeverity::Warning)
}
