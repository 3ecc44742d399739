//! Workcell - a persistent scripting kernel with a managed automation session
//!
//! A [`Kernel`] keeps one variable namespace alive across requests. Each
//! request runs a cell (or a batch of cells) of a small scripting language
//! against it, captures stdout and stderr, and reports the resulting
//! variables. When an automation endpoint is configured, the kernel makes a
//! healthy session handle available to the cell as `srv`.
//!
//! # Example
//!
//! ```no_run
//! use workcell::{format_output, Kernel, OutputFormat, Report};
//!
//! let kernel = Kernel::detached();
//! let outcome = kernel.run_cell("x = 6 * 7\nprint(x)").unwrap();
//! println!("{}", format_output(&Report::Run(outcome), &OutputFormat::Human));
//! ```

pub mod cli;
pub mod context;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod output;
pub mod parser;
pub mod repl;
pub mod script;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

pub use context::{Context, EvalStatus, Snapshot, VariableInfo};
pub use engine::{Evaluator, ScriptEvaluator, Value};
pub use error::{Result, WorkcellError};
pub use kernel::{Kernel, KernelConfig, RunOutcome};
pub use output::{format_output, OutputFormat, Report};
pub use parser::{parse_program, Program};
pub use script::{explain_source, ScriptRunner};
pub use session::{SessionManager, SessionPolicy, SessionStatus};
