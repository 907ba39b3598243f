//! Syntax-only checks of generated source code.
//!
//! Each checker wraps a language's own compiler or interpreter and provides:
//! - Availability detection (via `which`)
//! - A one-shot check of an in-memory source string
//! - Output parsing to diagnostics
//!
//! Checks never touch the caller's files: the source is written to a
//! temporary file that is removed when the check returns, whatever the
//! outcome.

mod adapters;
mod process;
mod registry;

#[cfg(feature = "tool-perl")]
pub use adapters::PerlCheck;
#[cfg(feature = "tool-ruby")]
pub use adapters::RubyCheck;
#[cfg(feature = "tool-tsc")]
pub use adapters::TscCheck;
pub use process::{DEFAULT_TIMEOUT, ProcessOutput, run_on_source};
pub use registry::{available_checkers, checker_for_language, checkers, register_checker};

use serde::Serialize;
use std::time::Duration;

/// Errors from running an external checker.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0} is not available on this host")]
    NotAvailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
}

/// Static metadata about a checker.
#[derive(Debug, Clone, Copy)]
pub struct CheckerInfo {
    /// Checker name, reported as the validation method (e.g. "perl").
    pub name: &'static str,
    /// Language the checker validates.
    pub language: &'static str,
    /// Suffix for the temporary source file, including the dot.
    pub suffix: &'static str,
    /// Command and flags used for a syntax-only run (file path appended).
    pub check_cmd: &'static [&'static str],
    pub website: &'static str,
}

/// A single problem reported by a checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub tool: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(tool: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, line: usize, column: Option<usize>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{}:{}: {}", line, col, self.message),
            (Some(line), None) => write!(f, "{}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Result of one syntax check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub tool: String,
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Combined stdout and stderr, with the temporary path left in.
    pub raw_output: String,
}

impl CheckOutcome {
    pub fn passed(tool: &str, raw_output: String) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            diagnostics: Vec::new(),
            raw_output,
        }
    }

    pub fn failed(tool: &str, diagnostics: Vec<Diagnostic>, raw_output: String) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            diagnostics,
            raw_output,
        }
    }

    /// Diagnostics rendered one per line; falls back to the raw output when
    /// the checker's messages could not be parsed.
    pub fn messages(&self) -> Vec<String> {
        if self.diagnostics.is_empty() && !self.success {
            return self
                .raw_output
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect();
        }
        self.diagnostics.iter().map(|d| d.to_string()).collect()
    }
}

/// An external syntax checker.
pub trait SyntaxChecker: Send + Sync {
    /// Static metadata.
    fn info(&self) -> &CheckerInfo;

    /// Whether the checker's executable can be found on `PATH`.
    fn is_available(&self) -> bool;

    /// Version string reported by the executable.
    fn version(&self) -> Option<String>;

    /// Check `code` for syntax errors, killing the process after `timeout`.
    fn check(&self, code: &str, timeout: Duration) -> Result<CheckOutcome, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new("perl", "syntax error").at(3, None);
        assert_eq!(d.to_string(), "3: syntax error");
        let d = Diagnostic::new("tsc", "bad type").at(10, Some(5));
        assert_eq!(d.to_string(), "10:5: bad type");
        assert_eq!(Diagnostic::new("ruby", "odd").to_string(), "odd");
    }

    #[test]
    fn test_messages_fall_back_to_raw_output() {
        let outcome = CheckOutcome::failed("perl", vec![], "first\n\nsecond\n".to_string());
        assert_eq!(outcome.messages(), vec!["first", "second"]);

        let outcome = CheckOutcome::passed("perl", "- syntax OK\n".to_string());
        assert!(outcome.messages().is_empty());
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome = CheckOutcome::failed(
            "ruby",
            vec![Diagnostic::new("ruby", "unexpected end").at(2, None)],
            String::new(),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["diagnostics"][0]["line"], 2);
    }
}
