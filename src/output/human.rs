//! Human-readable output formatting

use crate::context::Snapshot;
use crate::output::formatter::Report;
use crate::session::SessionStatus;

/// Render a report for a terminal.
///
/// For run outcomes only captured stdout and the variable table are
/// included; the caller writes captured stderr to its own stderr.
pub fn format_human(report: &Report) -> String {
    match report {
        Report::Run(outcome) => {
            let mut output = outcome.stdout.clone();
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&format_variables(&outcome.variables));
            output
        }
        Report::Variables(snapshot) => format_variables(snapshot),
        Report::Session(status) => format_session(status.as_ref()),
        Report::Explanation(lines) => lines.join("\n"),
        Report::Message(message) => message.clone(),
    }
}

fn format_variables(snapshot: &Snapshot) -> String {
    let mut output = String::from("Variables\n---------\n");
    if snapshot.is_empty() {
        output.push_str("(none)");
        return output;
    }

    let name_width = snapshot.keys().map(|k| k.chars().count()).max().unwrap_or(0).max(4);
    let type_width = snapshot
        .values()
        .map(|v| v.type_name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    output.push_str(&format!("{:<name_width$}  {:<type_width$}  PREVIEW\n", "NAME", "TYPE"));
    for (name, info) in snapshot {
        output.push_str(&format!(
            "{:<name_width$}  {:<type_width$}  {}\n",
            name, info.type_name, info.preview
        ));
    }
    output.truncate(output.trim_end().len());
    output
}

fn format_session(status: Option<&SessionStatus>) -> String {
    let Some(status) = status else {
        return "Session\n-------\nState:      detached".to_string();
    };

    let connected = status
        .connected_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "Session\n\
         -------\n\
         State:      {}\n\
         Endpoint:   {}\n\
         Connects:   {}\n\
         Reconnects: {}\n\
         Connected:  {}",
        status.state,
        status.endpoint,
        status.connects,
        status.reconnects,
        connected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvalStatus, VariableInfo};
    use crate::kernel::RunOutcome;
    use crate::session::SessionState;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "count".to_string(),
            VariableInfo {
                type_name: "int".to_string(),
                preview: "3".to_string(),
            },
        );
        snapshot.insert(
            "label".to_string(),
            VariableInfo {
                type_name: "str".to_string(),
                preview: "ready".to_string(),
            },
        );
        snapshot
    }

    #[test]
    fn test_variables_table() {
        let text = format_human(&Report::Variables(snapshot()));
        assert_eq!(
            text,
            "Variables\n---------\nNAME   TYPE  PREVIEW\ncount  int   3\nlabel  str   ready"
        );
    }

    #[test]
    fn test_empty_variables() {
        let text = format_human(&Report::Variables(Snapshot::new()));
        assert!(text.ends_with("(none)"));
    }

    #[test]
    fn test_run_outcome_puts_stdout_first() {
        let outcome = RunOutcome {
            stdout: "hello".to_string(),
            stderr: "ignored".to_string(),
            variables: snapshot(),
            status: EvalStatus::Completed,
        };
        let text = format_human(&Report::Run(outcome));
        assert!(text.starts_with("hello\n\nVariables\n"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn test_session_report() {
        assert!(format_human(&Report::Session(None)).ends_with("detached"));

        let status = SessionStatus {
            state: SessionState::NoHandle,
            endpoint: "10.0.0.5:7000".to_string(),
            connects: 2,
            reconnects: 1,
            connected_at: None,
        };
        let text = format_human(&Report::Session(Some(status)));
        assert!(text.contains("State:      no_handle"));
        assert!(text.contains("Endpoint:   10.0.0.5:7000"));
        assert!(text.contains("Connected:  -"));
    }
}
