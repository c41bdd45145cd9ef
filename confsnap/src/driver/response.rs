//! Response type for command execution results.

use std::time::Duration;

/// Response from a command execution.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// The command output (command echo and trailing prompt removed).
    pub result: String,

    /// The raw output before normalization.
    pub raw_result: String,

    /// The prompt that was matched at the end.
    pub prompt: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,

    /// Failure message if the command failed (based on failure patterns).
    pub failure_message: Option<String>,
}

impl Response {
    /// Create a new successful response.
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        raw_result: impl Into<String>,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            raw_result: raw_result.into(),
            prompt: prompt.into(),
            elapsed,
            failure_message: None,
        }
    }

    /// Mark the response as failed.
    pub fn with_failure(mut self, failure_message: impl Into<String>) -> Self {
        self.failure_message = Some(failure_message.into());
        self
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}

/// Normalize raw PTY output for a command.
///
/// Line endings become `\n`, the echoed command line is dropped from the
/// front, and the trailing prompt line is dropped from the end. Everything
/// in between is kept verbatim.
pub(crate) fn normalize_output(raw: &str, command: &str) -> String {
    let text = normalize_line_endings(raw);

    let body = match text.split_once('\n') {
        Some((first, rest)) if !command.is_empty() && first.trim_end().ends_with(command) => rest,
        _ => text.as_str(),
    };

    match memchr::memrchr(b'\n', body.as_bytes()) {
        Some(pos) => body[..pos].to_string(),
        None => String::new(),
    }
}

/// Map `\r\n`, `\r\r\n`, and `\n\r` to `\n`; a lone `\r` also ends a line.
fn normalize_line_endings(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                let mut returns = 1;
                while chars.next_if_eq(&'\r').is_some() {
                    returns += 1;
                }
                if chars.next_if_eq(&'\n').is_some() {
                    out.push('\n');
                } else {
                    out.extend(std::iter::repeat_n('\n', returns));
                }
            }
            '\n' => {
                chars.next_if_eq(&'\r');
                out.push('\n');
            }
            c => out.push(c),
        }
    }

    out
}
