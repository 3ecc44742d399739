//! Interactive REPL implementation

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{Result, WorkcellError};
use crate::kernel::Kernel;
use crate::output::{format_output, OutputFormat, Report};
use crate::repl::input::{brace_delta, parse_command, ReplCommand};

pub fn run_repl(kernel: Kernel) -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| WorkcellError::ExecutionError(e.to_string()))?;

    println!("Workcell v{} - Interactive Mode", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for commands, 'exit' to quit\n");

    // Buffer for cells spanning several lines
    let mut input_buffer = String::new();
    let mut block_depth: i32 = 0;

    loop {
        let prompt = if block_depth > 0 {
            format!("{}...> ", "  ".repeat(block_depth as usize))
        } else {
            "workcell> ".to_string()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() && block_depth == 0 {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                if block_depth == 0 {
                    match parse_command(&line) {
                        ReplCommand::Exit => {
                            println!("Goodbye!");
                            break;
                        }
                        ReplCommand::Code(_) => {}
                        command => {
                            handle_command(&kernel, command);
                            continue;
                        }
                    }
                }

                block_depth += brace_delta(&line);
                if !input_buffer.is_empty() {
                    input_buffer.push('\n');
                }
                input_buffer.push_str(&line);

                if block_depth <= 0 {
                    block_depth = 0;
                    let cell = std::mem::take(&mut input_buffer);
                    run_cell(&kernel, &cell);
                }
            }
            Err(ReadlineError::Interrupted) => {
                if block_depth > 0 {
                    println!("^C (input cancelled)");
                    input_buffer.clear();
                    block_depth = 0;
                } else {
                    println!("^C");
                }
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    kernel.shutdown();
    Ok(())
}

fn run_cell(kernel: &Kernel, cell: &str) {
    match kernel.run_cell(cell) {
        Ok(outcome) => {
            print!("{}", outcome.stdout);
            eprint!("{}", outcome.stderr);
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn handle_command(kernel: &Kernel, command: ReplCommand) {
    let format = OutputFormat::Human;
    match command {
        ReplCommand::Help => print_help(),
        ReplCommand::Clear => print!("\x1B[2J\x1B[1;1H"),
        ReplCommand::Variables => {
            println!("{}\n", format_output(&Report::Variables(kernel.variables()), &format));
        }
        ReplCommand::Session => {
            println!("{}\n", format_output(&Report::Session(kernel.session_status()), &format));
        }
        ReplCommand::Reset => {
            kernel.reset();
            println!("Context reset\n");
        }
        ReplCommand::Delete(name) => {
            let deleted = kernel.delete_variable(&name);
            println!("Deleted '{}'\n", deleted);
        }
        ReplCommand::Set { name, kind, value } => match kernel.set_variable(&name, &value, &kind) {
            Ok(value) => println!("{} = {}\n", name, value.repr().unwrap_or_default()),
            Err(e) => eprintln!("Error: {}\n", e),
        },
        ReplCommand::Usage(usage) => eprintln!("Usage: {}\n", usage),
        ReplCommand::Exit | ReplCommand::Code(_) => {}
    }
}

fn print_help() {
    println!(
        r#"
Workcell Commands
=================

CELLS:
  x = 42                          - Bind a variable
  print(x * 2)                    - Write to captured stdout
  fn double(n) {{                   - Blocks may span several lines;
      return n * 2                  the cell runs once every {{ is closed
  }}

  srv.get("TAG")                  - Read from the automation session
  srv.set("TAG", 1)               - Write to the automation session
  srv.cmd("START")                - Send a command to the session

REPL Commands:
  vars, variables                 - Show user variables
  session                         - Show session status
  set NAME KIND VALUE             - Bind NAME from text (int, float, bool, str)
  del NAME                        - Delete a variable
  reset                           - Drop all user variables
  help, ?                         - Show this help
  clear, cls                      - Clear screen
  exit, quit, q                   - Exit REPL
"#
    );
}
