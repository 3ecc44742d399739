//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::kernel::KernelConfig;
use crate::session::SessionPolicy;

#[derive(Parser, Debug)]
#[command(name = "workcell")]
#[command(author, version, about = "Persistent scripting kernel with a managed automation session", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where the kernel's automation session lives
#[derive(clap::Args, Debug, Clone)]
pub struct SessionArgs {
    /// Automation endpoint as host:port, or `memory` for an in-process one.
    /// Without it the kernel runs with no session.
    #[arg(long, env = "WORKCELL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Keep one session across requests or open one per request
    #[arg(long, value_enum, env = "WORKCELL_POLICY", default_value_t = SessionPolicy::Persistent)]
    pub policy: SessionPolicy,

    /// Connect timeout in milliseconds
    #[arg(long, env = "WORKCELL_CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout for session requests in milliseconds
    #[arg(long, env = "WORKCELL_IO_TIMEOUT_MS", default_value = "30000")]
    pub io_timeout_ms: u64,
}

impl SessionArgs {
    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            endpoint: self.endpoint.clone().filter(|e| !e.trim().is_empty()),
            policy: self.policy,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Serve the kernel over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "WORKCELL_BIND", default_value = "127.0.0.1:8000")]
        bind: String,

        #[command(flatten)]
        session: SessionArgs,

        /// Emit logs as JSON lines
        #[arg(long, env = "WORKCELL_LOG_JSON")]
        log_json: bool,
    },

    /// Run script files as cells against a fresh kernel
    Run {
        /// Script files, each run as one cell in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Variables bound before the first cell, in the form key=value
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Explain a script or cell without executing it
    Explain {
        /// Cell source or path to a script file
        input: String,
    },

    /// Start interactive REPL mode
    Repl {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let args = Args::try_parse_from(["workcell", "serve"]).unwrap();
        match args.command {
            SubCommand::Serve { bind, session, log_json } => {
                assert_eq!(bind, "127.0.0.1:8000");
                assert!(!log_json);
                let config = session.kernel_config();
                assert!(config.endpoint.is_none());
                assert_eq!(config.policy, SessionPolicy::Persistent);
                assert_eq!(config.connect_timeout, Duration::from_secs(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_with_args_and_policy() {
        let args = Args::try_parse_from([
            "workcell",
            "--json",
            "run",
            "a.wc",
            "b.wc",
            "--arg",
            "rate=2",
            "--endpoint",
            "memory",
            "--policy",
            "per-request",
        ])
        .unwrap();

        assert!(args.json);
        match args.command {
            SubCommand::Run { files, args, session } => {
                assert_eq!(files, vec![PathBuf::from("a.wc"), PathBuf::from("b.wc")]);
                assert_eq!(args, vec!["rate=2".to_string()]);
                assert_eq!(session.endpoint.as_deref(), Some("memory"));
                assert_eq!(session.policy, SessionPolicy::PerRequest);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Args::try_parse_from(["workcell", "run"]).is_err());
    }
}
