//! REPL module for interactive mode

#[cfg(any(feature = "repl", test))]
mod input;
#[cfg(feature = "repl")]
pub mod interactive;

#[cfg(feature = "repl")]
pub use interactive::run_repl;

#[cfg(not(feature = "repl"))]
pub fn run_repl(_kernel: crate::kernel::Kernel) -> crate::error::Result<()> {
    Err(crate::error::WorkcellError::ExecutionError(
        "REPL not enabled. Rebuild with --features repl".to_string(),
    ))
}
