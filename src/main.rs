//! Workcell CLI - serve or run a persistent scripting kernel

use anyhow::{bail, Context as _};
use clap::Parser;
use workcell::cli::{Args, SubCommand};
use workcell::{explain_source, format_output, Kernel, OutputFormat, Report, ScriptRunner};

fn main() {
    let args = Args::parse();

    let log_json = matches!(args.command, SubCommand::Serve { log_json: true, .. });
    workcell::logging::init(args.verbose, log_json);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_flag(args.json);

    match args.command {
        SubCommand::Serve { bind, session, .. } => serve(&bind, Kernel::new(&session.kernel_config())),

        SubCommand::Run {
            files,
            args: script_args,
            session,
        } => {
            let runner = ScriptRunner::new(Kernel::new(&session.kernel_config())).with_args(script_args);
            let outcome = runner.run_files(&files)?;
            let status = outcome.status;

            if output_format == OutputFormat::Human {
                eprint!("{}", outcome.stderr);
            }
            println!("{}", format_output(&Report::Run(outcome), &output_format));

            runner.kernel().shutdown();
            if let workcell::EvalStatus::Failed(kind) = status {
                bail!("script stopped with {}", kind);
            }
            Ok(())
        }

        SubCommand::Explain { input } => {
            let path = std::path::Path::new(&input);
            let (source, origin) = if path.is_file() {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                (source, Some(path.display().to_string()))
            } else {
                (input.clone(), None)
            };

            let mut lines = Vec::new();
            if let Some(origin) = origin {
                lines.push(format!("Script: {}", origin));
            }
            lines.extend(explain_source(&source)?);
            println!("{}", format_output(&Report::Explanation(lines), &output_format));
            Ok(())
        }

        SubCommand::Repl { session } => {
            workcell::repl::run_repl(Kernel::new(&session.kernel_config()))?;
            Ok(())
        }
    }
}

#[cfg(feature = "server")]
fn serve(bind: &str, kernel: Kernel) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(workcell::server::serve(std::sync::Arc::new(kernel), bind))?;
    Ok(())
}

#[cfg(not(feature = "server"))]
fn serve(_bind: &str, _kernel: Kernel) -> anyhow::Result<()> {
    bail!("HTTP server not enabled. Rebuild with --features server")
}
