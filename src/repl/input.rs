//! Line handling for the interactive prompt

/// A line typed at the top level of the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Help,
    Clear,
    Variables,
    Session,
    Reset,
    Delete(String),
    /// `set NAME KIND VALUE`; the value keeps its inner spaces
    Set {
        name: String,
        kind: String,
        value: String,
    },
    Usage(&'static str),
    /// Anything else is cell source
    Code(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (trimmed, ""),
    };

    match (word.to_lowercase().as_str(), rest.is_empty()) {
        ("exit" | "quit" | "q", true) => ReplCommand::Exit,
        ("help" | "?", true) => ReplCommand::Help,
        ("clear" | "cls", true) => ReplCommand::Clear,
        ("vars" | "variables", true) => ReplCommand::Variables,
        ("session", true) => ReplCommand::Session,
        ("reset", true) => ReplCommand::Reset,
        ("del", false) => ReplCommand::Delete(rest.to_string()),
        ("del", true) => ReplCommand::Usage("del NAME"),
        ("set", _) => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(kind), Some(value)) if !name.is_empty() => ReplCommand::Set {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    value: value.trim_start().to_string(),
                },
                _ => ReplCommand::Usage("set NAME KIND VALUE"),
            }
        }
        _ => ReplCommand::Code(line.to_string()),
    }
}

/// Net change in open `{` blocks on `line`, ignoring string literals and comments
pub fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => break,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_commands() {
        assert_eq!(parse_command("exit"), ReplCommand::Exit);
        assert_eq!(parse_command(" VARS "), ReplCommand::Variables);
        assert_eq!(parse_command("del rate"), ReplCommand::Delete("rate".to_string()));
        assert_eq!(parse_command("del"), ReplCommand::Usage("del NAME"));
        assert_eq!(
            parse_command("set label str hello world"),
            ReplCommand::Set {
                name: "label".to_string(),
                kind: "str".to_string(),
                value: "hello world".to_string(),
            }
        );
        assert_eq!(parse_command("set n int"), ReplCommand::Usage("set NAME KIND VALUE"));
    }

    #[test]
    fn test_code_passes_through() {
        assert_eq!(parse_command("x = 1"), ReplCommand::Code("x = 1".to_string()));
        assert_eq!(parse_command("reset = 2"), ReplCommand::Code("reset = 2".to_string()));
        assert_eq!(parse_command("print(vars)"), ReplCommand::Code("print(vars)".to_string()));
    }

    #[test]
    fn test_brace_delta() {
        assert_eq!(brace_delta("while x < 3 {"), 1);
        assert_eq!(brace_delta("} else {"), 0);
        assert_eq!(brace_delta("}"), -1);
        assert_eq!(brace_delta("m = {\"a\": 1}"), 0);
        assert_eq!(brace_delta("s = \"{\""), 0);
        assert_eq!(brace_delta("s = '\\'{'"), 0);
        assert_eq!(brace_delta("x = 1 # {"), 0);
    }
}
