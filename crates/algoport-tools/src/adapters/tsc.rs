//! TypeScript compiler adapter - type-only check.
//!
//! https://www.typescriptlang.org/

use crate::{CheckOutcome, CheckerInfo, Diagnostic, SyntaxChecker, ToolError, run_on_source};
use std::path::PathBuf;
use std::time::Duration;

/// `tsc --noEmit` checker.
pub struct TscCheck;

const TSC_INFO: CheckerInfo = CheckerInfo {
    name: "tsc",
    language: "typescript",
    suffix: ".ts",
    check_cmd: &["tsc", "--noEmit", "--pretty", "false"],
    website: "https://www.typescriptlang.org/",
};

fn tsc_command() -> Option<PathBuf> {
    // tsc binary comes from the "typescript" package
    which::which("tsc").ok()
}

impl SyntaxChecker for TscCheck {
    fn info(&self) -> &CheckerInfo {
        &TSC_INFO
    }

    fn is_available(&self) -> bool {
        tsc_command().is_some()
    }

    fn version(&self) -> Option<String> {
        let tsc = tsc_command()?;
        super::capture_stdout(&tsc, &["--version"])
            .map(|v| v.trim_start_matches("Version ").to_string())
    }

    fn check(&self, code: &str, timeout: Duration) -> Result<CheckOutcome, ToolError> {
        let tsc = tsc_command().ok_or_else(|| ToolError::NotAvailable("tsc".to_string()))?;
        let output = run_on_source(&tsc, &TSC_INFO.check_cmd[1..], code, TSC_INFO.suffix, timeout)?;

        // tsc prints diagnostics on stdout
        let combined = output.combined();
        if output.success() {
            return Ok(CheckOutcome::passed("tsc", combined));
        }
        Ok(CheckOutcome::failed("tsc", parse_tsc_output(&combined), combined))
    }
}

/// Parse TypeScript compiler output.
///
/// Format: `file.ts(10,5): error TS2322: Type 'string' is not assignable to type 'number'.`
fn parse_tsc_output(output: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in output.lines() {
        if let Some((loc_part, rest)) = line.split_once("): ")
            && let Some((_file, pos)) = loc_part.rsplit_once('(')
            && let Some((line_num, col_num)) = pos.split_once(',')
        {
            let line_num = line_num.parse().unwrap_or(1);
            let col_num = col_num.parse().ok();
            // "error TS2322: message" -> "TS2322: message"
            let message = rest
                .strip_prefix("error ")
                .or_else(|| rest.strip_prefix("warning "))
                .unwrap_or(rest);
            diagnostics.push(Diagnostic::new("tsc", message).at(line_num, col_num));
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tsc_output() {
        let out = "/tmp/algoport-1.ts(10,5): error TS2322: Type 'string' is not assignable to type 'number'.\n\
                   Found 1 error.\n";
        let diags = parse_tsc_output(out);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, Some(10));
        assert_eq!(diags[0].column, Some(5));
        assert_eq!(
            diags[0].message,
            "TS2322: Type 'string' is not assignable to type 'number'."
        );
    }
}
