//! Error types for Workcell

use thiserror::Error;

use crate::context::ConversionError;
use crate::session::SessionUnavailable;

#[derive(Error, Debug)]
pub enum WorkcellError {
    #[error("invalid syntax at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    SessionUnavailable(#[from] SessionUnavailable),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type Result<T> = std::result::Result<T, WorkcellError>;

