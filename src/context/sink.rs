//! Captured script output

use serde::Serialize;

/// In-memory stdout and stderr for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputSink {
    pub stdout: String,
    pub stderr: String,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_out(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    pub fn write_err(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    pub fn into_parts(self) -> (String, String) {
        (self.stdout, self.stderr)
    }
}
