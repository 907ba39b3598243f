//! Ruby interpreter adapter - syntax check.
//!
//! `ruby -c` parses the script and prints `Syntax OK` without running it.
//! https://www.ruby-lang.org/

use crate::{CheckOutcome, CheckerInfo, Diagnostic, SyntaxChecker, ToolError, run_on_source};
use std::path::PathBuf;
use std::time::Duration;

/// `ruby -c` syntax checker.
pub struct RubyCheck;

const RUBY_INFO: CheckerInfo = CheckerInfo {
    name: "ruby",
    language: "ruby",
    suffix: ".rb",
    check_cmd: &["ruby", "-c"],
    website: "https://www.ruby-lang.org/",
};

fn ruby_command() -> Option<PathBuf> {
    which::which("ruby").ok()
}

impl SyntaxChecker for RubyCheck {
    fn info(&self) -> &CheckerInfo {
        &RUBY_INFO
    }

    fn is_available(&self) -> bool {
        ruby_command().is_some()
    }

    fn version(&self) -> Option<String> {
        let ruby = ruby_command()?;
        super::capture_stdout(&ruby, &["-e", "print RUBY_VERSION"])
    }

    fn check(&self, code: &str, timeout: Duration) -> Result<CheckOutcome, ToolError> {
        let ruby = ruby_command().ok_or_else(|| ToolError::NotAvailable("ruby".to_string()))?;
        let output = run_on_source(&ruby, &["-c"], code, RUBY_INFO.suffix, timeout)?;

        let combined = output.combined();
        if output.success() {
            return Ok(CheckOutcome::passed("ruby", combined));
        }
        Ok(CheckOutcome::failed("ruby", parse_ruby_output(&output.stderr), combined))
    }
}

/// Parse ruby syntax errors.
///
/// Format: `/tmp/x.rb:3: syntax error, unexpected end-of-input`
fn parse_ruby_output(output: &str) -> Vec<Diagnostic> {
    super::parse_colon_located(output, RUBY_INFO.suffix, "ruby")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_syntax_error() {
        let out = "/tmp/algoport-x.rb:3: syntax error, unexpected end-of-input, expecting `end'\n";
        let diags = parse_ruby_output(out);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(3));
        assert!(diags[0].message.starts_with("syntax error"));
    }

    #[test]
    fn test_parse_skips_context_lines() {
        let out = "/tmp/a.rb:2: syntax errors found (SyntaxError)\n  1 | def f\n> 2 | \n";
        let diags = parse_ruby_output(out);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "syntax errors found (SyntaxError)");
    }

    #[test]
    fn test_check_when_available() {
        let checker = RubyCheck;
        if !checker.is_available() {
            return;
        }
        let ok = checker.check("x = 1\nputs x\n", crate::DEFAULT_TIMEOUT).unwrap();
        assert!(ok.success);
        let bad = checker.check("def f\n", crate::DEFAULT_TIMEOUT).unwrap();
        assert!(!bad.success);
    }
}
