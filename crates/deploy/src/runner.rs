//! Execution of the external deployment toolchain.

use std::{fmt, future::Future, process::Stdio};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};

/// Marker the toolchain prints when the block explorer has not indexed the
/// freshly broadcast contract yet.
///
/// This is vendor output matched verbatim. It is the only place to update if the
/// toolchain rewords the message.
pub const EXPLORER_NOT_DETECTED: &str = "could not detect the deployment";

/// A fully specified toolchain command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the subprocess, on top of the caller's environment.
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

/// The command line, without environment values.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of one toolchain execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Stdout and stderr lines, in the order they arrived.
    pub output: String,
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl Outcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(0),
            success: true,
        }
    }

    pub fn failed(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(exit_code),
            success: false,
        }
    }
}

/// How an [`Outcome`] should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// The explorer could not see the deployment yet; worth retrying.
    TransientVerificationFault,
    Failed,
}

/// Classify an outcome. The explorer marker wins over the exit status.
pub fn classify(outcome: &Outcome) -> Classification {
    if outcome.output.contains(EXPLORER_NOT_DETECTED) {
        Classification::TransientVerificationFault
    } else if outcome.success {
        Classification::Success
    } else {
        Classification::Failed
    }
}

/// Something that can run toolchain invocations.
pub trait CommandRunner {
    /// Run the invocation to completion.
    ///
    /// Only failing to start or to observe the process is an error; a non-zero
    /// exit is reported through [`Outcome`].
    fn execute(&self, invocation: &Invocation) -> impl Future<Output = Result<Outcome>> + Send;
}

/// Runs invocations as child processes, echoing their output as it arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<Outcome> {
        tracing::info!(command = %invocation, "Running toolchain");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`", invocation.program))?;

        let stdout = child.stdout.take().context("Child stdout was not captured")?;
        let stderr = child.stderr.take().context("Child stderr was not captured")?;

        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
        let mut output = String::new();
        let (mut stdout_done, mut stderr_done) = (false, false);

        // Lines are read as raw bytes: the process must never be dropped (and
        // killed) because of what it prints.
        while !(stdout_done && stderr_done) {
            tokio::select! {
                read = stdout.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                    stdout_done = take_line(read, &mut stdout_buf, "stdout", &mut output);
                }
                read = stderr.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                    stderr_done = take_line(read, &mut stderr_buf, "stderr", &mut output);
                }
            }
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for toolchain process")?;

        tracing::debug!(command = %invocation, ?status, "Toolchain exited");

        Ok(Outcome {
            output,
            exit_code: status.code(),
            success: status.success(),
        })
    }
}

/// Echo and accumulate the line buffered in `buf`. Returns `true` once the
/// stream is exhausted.
fn take_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    stream: &'static str,
    output: &mut String,
) -> bool {
    let read = match read {
        Ok(read) => read,
        Err(err) => {
            tracing::warn!(stream, %err, "Stopped reading toolchain output");
            0
        }
    };

    // A cancelled read may have left a partial line behind.
    if !buf.is_empty() {
        let line = String::from_utf8_lossy(buf);
        let line = line.trim_end_matches(['\n', '\r']);
        tracing::info!(target: "toolchain", stream, "{}", line);
        output.push_str(line);
        output.push('\n');
        buf.clear();
    }

    read == 0
}
