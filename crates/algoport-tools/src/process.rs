//! Temp-file + subprocess + timeout runner shared by all checkers.

use crate::ToolError;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Timeout applied when the caller has no preference.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished checker process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Write `code` to a temporary file ending in `suffix`, run
/// `program <args..> <file>` and wait at most `timeout` for it to exit.
///
/// The temporary file is deleted on every return path when the
/// `NamedTempFile` guard drops, including timeouts and spawn failures.
pub fn run_on_source(
    program: &Path,
    args: &[&str],
    code: &str,
    suffix: &str,
    timeout: Duration,
) -> Result<ProcessOutput, ToolError> {
    let mut file = tempfile::Builder::new()
        .prefix("algoport-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(code.as_bytes())?;
    file.flush()?;

    let mut child = Command::new(program)
        .args(args)
        .arg(file.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes concurrently so a chatty checker cannot block on a
    // full pipe while we wait for it to exit.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, timeout)? {
        Some(status) => status,
        None => {
            tracing::debug!(program = %program.display(), ?timeout, "killing checker");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::Timeout {
                tool: program_name(program),
                timeout,
            });
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, ToolError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> Option<PathBuf> {
        which::which("sh").ok()
    }

    #[test]
    fn test_captures_output_and_status() {
        let Some(sh) = sh() else { return };
        let out = run_on_source(&sh, &[], "echo out; echo err >&2; exit 3\n", ".sh", DEFAULT_TIMEOUT)
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.combined(), "out\nerr\n");
    }

    #[test]
    fn test_timeout_kills_process() {
        let Some(sh) = sh() else { return };
        let err = run_on_source(&sh, &[], "sleep 5\n", ".sh", Duration::from_millis(100))
            .unwrap_err();
        match err {
            ToolError::Timeout { tool, .. } => assert_eq!(tool, "sh"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_temp_file_is_removed() {
        let Some(sh) = sh() else { return };
        // The script prints its own path; it must be gone once we return.
        let out = run_on_source(&sh, &[], "echo \"$0\"\n", ".sh", DEFAULT_TIMEOUT).unwrap();
        let path = PathBuf::from(out.stdout.trim());
        assert!(path.to_string_lossy().contains("algoport-"));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let err = run_on_source(
            Path::new("/nonexistent/algoport-checker"),
            &[],
            "",
            ".txt",
            DEFAULT_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Io(_)));
    }
}
