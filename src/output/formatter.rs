//! Output formatting

use crate::context::Snapshot;
use crate::kernel::RunOutcome;
use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Something the CLI prints
#[derive(Debug, Clone)]
pub enum Report {
    Run(RunOutcome),
    Variables(Snapshot),
    /// `None` when the kernel runs without a session
    Session(Option<SessionStatus>),
    Explanation(Vec<String>),
    Message(String),
}

pub fn format_output(report: &Report, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}
