//! JSON output formatting

use crate::output::formatter::Report;
use serde_json::{json, Value};

pub fn format_json(report: &Report) -> String {
    let data: Value = match report {
        Report::Run(outcome) => serde_json::to_value(outcome).unwrap_or(json!(null)),
        Report::Variables(snapshot) => serde_json::to_value(snapshot).unwrap_or(json!(null)),
        Report::Session(Some(status)) => serde_json::to_value(status).unwrap_or(json!(null)),
        Report::Session(None) => json!({ "state": "detached" }),
        Report::Explanation(lines) => json!({ "explanation": lines }),
        Report::Message(message) => json!({ "message": message }),
    };

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvalStatus, Snapshot, VariableInfo};
    use crate::kernel::RunOutcome;

    #[test]
    fn test_run_outcome_shape() {
        let mut variables = Snapshot::new();
        variables.insert(
            "x".to_string(),
            VariableInfo {
                type_name: "float".to_string(),
                preview: "2.5".to_string(),
            },
        );
        let outcome = RunOutcome {
            stdout: "out\n".to_string(),
            stderr: String::new(),
            variables,
            status: EvalStatus::Completed,
        };

        let parsed: Value = serde_json::from_str(&format_json(&Report::Run(outcome))).unwrap();
        assert_eq!(
            parsed,
            json!({
                "stdout": "out\n",
                "stderr": "",
                "variables": { "x": { "type": "float", "preview": "2.5" } }
            })
        );
    }

    #[test]
    fn test_detached_session() {
        let parsed: Value = serde_json::from_str(&format_json(&Report::Session(None))).unwrap();
        assert_eq!(parsed, json!({ "state": "detached" }));
    }
}
