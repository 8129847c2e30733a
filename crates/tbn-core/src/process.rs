//! Subprocess execution with a caller-supplied deadline.
//!
//! Output streams are redirected to files in the working directory so the
//! child can never block on a full pipe; on deadline expiry the child is
//! killed and reaped.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A short stderr excerpt for error messages, stdout as fallback.
    pub fn stderr_excerpt(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let mut excerpt: String = text.trim().chars().take(500).collect();
        if excerpt.len() < text.trim().len() {
            excerpt.push_str(" ...");
        }
        excerpt
    }
}

/// Runs the command to completion or the deadline, whichever comes first.
/// `capture_dir` must be a writable directory (typically the solver tempdir).
pub fn run_with_deadline(
    mut command: Command,
    capture_dir: &Path,
    deadline: Option<Duration>,
) -> Result<ProcessOutput, ProcessError> {
    let label = format!("{command:?}");
    let stdout_path = capture_dir.join("stdout.capture");
    let stderr_path = capture_dir.join("stderr.capture");
    let stdout_file = File::create(&stdout_path)?;
    let stderr_file = File::create(&stderr_path)?;

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: label.clone(),
            source,
        })?;

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(timeout) = deadline {
            if started.elapsed() >= timeout {
                child.kill().ok();
                child.wait().ok();
                return Err(ProcessError::TimedOut {
                    command: label,
                    timeout,
                });
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    File::open(&stdout_path)?.read_to_string(&mut stdout)?;
    File::open(&stderr_path)?.read_to_string(&mut stderr)?;
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}
