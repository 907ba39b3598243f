//! Checker adapters.
//!
//! Each adapter wraps one external executable and provides:
//! - Availability detection
//! - A syntax-only run over a temporary file
//! - Output parsing to diagnostics

#[cfg(feature = "tool-perl")]
mod perl;
#[cfg(feature = "tool-ruby")]
mod ruby;
#[cfg(feature = "tool-tsc")]
mod tsc;

#[cfg(feature = "tool-perl")]
pub use perl::PerlCheck;
#[cfg(feature = "tool-ruby")]
pub use ruby::RubyCheck;
#[cfg(feature = "tool-tsc")]
pub use tsc::TscCheck;

/// Run `program args..` and return trimmed stdout when it exits cleanly.
#[cfg(any(feature = "tool-perl", feature = "tool-ruby", feature = "tool-tsc"))]
pub(crate) fn capture_stdout(program: &std::path::Path, args: &[&str]) -> Option<String> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse `<file><suffix>:<line>: <message>` lines, as printed by interpreters
/// that report errors against the script path.
#[cfg(feature = "tool-ruby")]
pub(crate) fn parse_colon_located(output: &str, suffix: &str, tool: &str) -> Vec<crate::Diagnostic> {
    use crate::Diagnostic;

    let marker = format!("{suffix}:");
    let mut diagnostics = Vec::new();
    for line in output.lines() {
        let Some(idx) = line.find(&marker) else {
            continue;
        };
        let rest = &line[idx + marker.len()..];
        let Some((num, message)) = rest.split_once(':') else {
            continue;
        };
        let Ok(line_num) = num.trim().parse::<usize>() else {
            continue;
        };
        diagnostics.push(Diagnostic::new(tool, message.trim()).at(line_num, None));
    }
    diagnostics
}
