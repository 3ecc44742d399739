//! Script runner for executing cell files outside the server

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::KindTag;
use crate::error::{Result, WorkcellError};
use crate::kernel::{Kernel, RunOutcome};
use crate::parser::{parse_program, Program};
use crate::script::validator::{validate_program, ValidationOptions};

/// Runs script files as cells against one kernel
pub struct ScriptRunner {
    kernel: Kernel,
    /// Script arguments passed via --arg
    script_args: Vec<(String, String)>,
}

impl ScriptRunner {
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            script_args: Vec::new(),
        }
    }

    /// Set script arguments; entries without `=` are ignored
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        for arg in args {
            if let Some((key, value)) = arg.split_once('=') {
                self.script_args.push((key.trim().to_string(), value.to_string()));
            }
        }
        self
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Read every file, bind the script arguments, then run the files in
    /// order as cells. Nothing runs if a file cannot be read.
    pub fn run_files(&self, paths: &[PathBuf]) -> Result<RunOutcome> {
        let sources = paths
            .iter()
            .map(|path| read_script(path))
            .collect::<Result<Vec<_>>>()?;

        self.inject_script_args()?;
        debug!(cells = sources.len(), "running script files");
        Ok(self.kernel.run_cells(sources.as_slice())?)
    }

    /// Bind script arguments as variables, inferring their kind
    fn inject_script_args(&self) -> Result<()> {
        for (key, value) in &self.script_args {
            let kind = infer_kind(value);
            self.kernel.set_variable(key, value, kind.as_str())?;
        }
        Ok(())
    }
}

fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        WorkcellError::ExecutionError(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Integer, then float, then `true`/`false`; anything else stays text
pub fn infer_kind(value: &str) -> KindTag {
    if value.trim().parse::<i64>().is_ok() {
        KindTag::Int
    } else if value.trim().parse::<f64>().is_ok() {
        KindTag::Float
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        KindTag::Bool
    } else {
        KindTag::Str
    }
}

/// Explain a parsed cell without executing it
pub fn explain_script(program: &Program) -> Vec<String> {
    program
        .statements
        .iter()
        .enumerate()
        .map(|(i, stmt)| format!("{}. {}", i + 1, stmt.summary()))
        .collect()
}

/// Parse `source` and list its statements followed by any validation notes
pub fn explain_source(source: &str) -> Result<Vec<String>> {
    let program = parse_program(source)?;
    let mut lines = vec![format!("Statements: {}", program.statements.len())];
    lines.extend(explain_script(&program));

    let issues = validate_program(&program, &ValidationOptions::default());
    if !issues.is_empty() {
        lines.push(String::new());
        lines.push("Validation Notes:".to_string());
        lines.extend(issues.iter().map(|issue| format!("  - {}", issue)));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn script_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_with_args_skips_malformed() {
        let runner = ScriptRunner::new(Kernel::detached())
            .with_args(vec!["a=1".into(), "broken".into(), "b = x=y".into()]);
        assert_eq!(
            runner.script_args,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), " x=y".to_string())
            ]
        );
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(infer_kind("42"), KindTag::Int);
        assert_eq!(infer_kind("2.5"), KindTag::Float);
        assert_eq!(infer_kind("TRUE"), KindTag::Bool);
        assert_eq!(infer_kind("false"), KindTag::Bool);
        assert_eq!(infer_kind("/tmp/out"), KindTag::Str);
    }

    #[test]
    fn test_run_files_in_order_with_args() {
        let first = script_file("total = base * 2\n");
        let second = script_file("print(total + 1)\n");
        let runner = ScriptRunner::new(Kernel::detached()).with_args(vec!["base=20".into()]);

        let outcome = runner
            .run_files(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();

        assert_eq!(outcome.stdout, "41\n");
        assert!(outcome.status.is_success());
        assert_eq!(outcome.variables["total"].preview, "40");
        assert_eq!(runner.kernel().variables()["base"].type_name, "int");
    }

    #[test]
    fn test_missing_file_runs_nothing() {
        let good = script_file("x = 1\n");
        let runner = ScriptRunner::new(Kernel::detached());
        let err = runner
            .run_files(&[good.path().to_path_buf(), PathBuf::from("/nonexistent/cell.wc")])
            .unwrap_err();

        assert!(err.to_string().contains("cannot read /nonexistent/cell.wc"));
        assert!(runner.kernel().variables().is_empty());
    }

    #[test]
    fn test_reserved_arg_is_rejected() {
        let file = script_file("x = 1\n");
        let runner = ScriptRunner::new(Kernel::detached()).with_args(vec!["math=1".into()]);
        let err = runner.run_files(&[file.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, WorkcellError::Conversion(_)));
    }

    #[test]
    fn test_explain_source() {
        let lines = explain_source("x = 1\nfn f(a) { return a }\nwhile true { x += 1 }").unwrap();
        assert_eq!(lines[0], "Statements: 3");
        assert_eq!(lines[1], "1. assign x =");
        assert_eq!(lines[2], "2. fn f(a)");
        assert_eq!(lines[3], "3. while (1 statements)");
        assert!(lines.iter().any(|l| l == "Validation Notes:"));
    }

    #[test]
    fn test_explain_rejects_bad_syntax() {
        assert!(explain_source("x = = 1").is_err());
    }

    #[test]
    fn test_args_are_typed() {
        let file = script_file("print(type(flag), type(ratio), type(name))\n");
        let runner = ScriptRunner::new(Kernel::detached())
            .with_args(vec!["flag=true".into(), "ratio=0.5".into(), "name=cell".into()]);
        runner.run_files(&[file.path().to_path_buf()]).unwrap();
        let variables = runner.kernel().variables();
        assert_eq!(variables["flag"].type_name, "bool");
        assert_eq!(variables["ratio"].type_name, "float");
        assert_eq!(variables["name"].type_name, "str");
    }
}
