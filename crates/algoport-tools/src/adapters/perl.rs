//! Perl interpreter adapter - compile-only syntax check.
//!
//! `perl -c` compiles the program (including `BEGIN` blocks and `use`
//! statements) without running the main body.
//! https://www.perl.org/

use crate::{CheckOutcome, CheckerInfo, Diagnostic, SyntaxChecker, ToolError, run_on_source};
use std::path::PathBuf;
use std::time::Duration;

/// `perl -c` syntax checker.
pub struct PerlCheck;

const PERL_INFO: CheckerInfo = CheckerInfo {
    name: "perl",
    language: "perl",
    suffix: ".pl",
    check_cmd: &["perl", "-c"],
    website: "https://www.perl.org/",
};

fn perl_command() -> Option<PathBuf> {
    which::which("perl").ok()
}

impl SyntaxChecker for PerlCheck {
    fn info(&self) -> &CheckerInfo {
        &PERL_INFO
    }

    fn is_available(&self) -> bool {
        perl_command().is_some()
    }

    fn version(&self) -> Option<String> {
        let perl = perl_command()?;
        super::capture_stdout(&perl, &["-e", "printf '%vd', $^V"])
    }

    fn check(&self, code: &str, timeout: Duration) -> Result<CheckOutcome, ToolError> {
        let perl = perl_command().ok_or_else(|| ToolError::NotAvailable("perl".to_string()))?;
        let output = run_on_source(&perl, &["-c"], code, PERL_INFO.suffix, timeout)?;

        // perl -c reports everything, including "syntax OK", on stderr.
        let combined = output.combined();
        if output.success() {
            return Ok(CheckOutcome::passed("perl", combined));
        }
        let diagnostics = parse_perl_output(&output.stderr);
        Ok(CheckOutcome::failed("perl", diagnostics, combined))
    }
}

/// Parse perl compile errors.
///
/// Format: `syntax error at /tmp/x.pl line 3, near "foo bar"`
fn parse_perl_output(output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.ends_with("syntax OK") || line.ends_with("had compilation errors.")
        {
            continue;
        }
        match locate(line) {
            Some((message, line_num)) => {
                diagnostics.push(Diagnostic::new("perl", message).at(line_num, None))
            }
            None => diagnostics.push(Diagnostic::new("perl", line.trim())),
        }
    }
    diagnostics
}

/// Split `"<message> at <file> line <n>[,.] <tail>"` into message and line.
fn locate(line: &str) -> Option<(String, usize)> {
    let idx = line.rfind(" line ")?;
    let digits: String = line[idx + 6..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let line_num = digits.parse().ok()?;
    let head = &line[..idx];
    let message = match head.rfind(" at ") {
        Some(at) => &head[..at],
        None => head,
    };
    let tail = line[idx + 6 + digits.len()..]
        .trim_start_matches(['.', ','])
        .trim();
    let message = if tail.is_empty() {
        message.to_string()
    } else {
        format!("{message}, {tail}")
    };
    Some((message, line_num))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_syntax_error() {
        let out = "syntax error at /tmp/algoport-abc.pl line 3, near \"foo bar\"\n\
                   /tmp/algoport-abc.pl had compilation errors.\n";
        let diags = parse_perl_output(out);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(3));
        assert_eq!(diags[0].message, "syntax error, near \"foo bar\"");
    }

    #[test]
    fn test_parse_strict_vars_error() {
        let out = "Global symbol \"$x\" requires explicit package name at /tmp/a.pl line 2.\n";
        let diags = parse_perl_output(out);
        assert_eq!(diags[0].line, Some(2));
        assert_eq!(
            diags[0].message,
            "Global symbol \"$x\" requires explicit package name"
        );
    }

    #[test]
    fn test_parse_ignores_summary_lines() {
        assert!(parse_perl_output("/tmp/a.pl syntax OK\n").is_empty());
    }

    #[test]
    fn test_unlocated_lines_are_kept() {
        let diags = parse_perl_output("  (Might be a runaway multi-line \"\" string)\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, None);
    }

    #[test]
    fn test_check_when_available() {
        let checker = PerlCheck;
        if !checker.is_available() {
            return;
        }
        let ok = checker
            .check("use strict;\nmy $x = 1;\n", crate::DEFAULT_TIMEOUT)
            .unwrap();
        assert!(ok.success);

        let bad = checker
            .check("use strict;\nmy $x = ;\n", crate::DEFAULT_TIMEOUT)
            .unwrap();
        assert!(!bad.success);
        assert!(bad.diagnostics.iter().any(|d| d.line == Some(2)));
    }
}
