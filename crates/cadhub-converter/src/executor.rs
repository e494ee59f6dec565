//! Child process execution for conversion tools.
//!
//! Runs a command with optional timeout, captures stdout/stderr, and kills
//! the process if the time limit is hit or the caller goes away.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Maximum stderr characters written to logs. The full text is kept in
/// the returned error.
const LOG_STDERR_CHARS: usize = 500;

/// Errors from running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be started.
    #[error("{tool} could not be started: {source}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// The process ran past its time limit and was killed.
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// Tool name.
        tool: String,
        /// The limit that was exceeded.
        seconds: u64,
    },

    /// The process exited unsuccessfully.
    #[error("{}", failure_text(.tool, .code, .stdout, .stderr))]
    Failed {
        /// Tool name.
        tool: String,
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Waiting on the process failed.
    #[error("I/O error while running {tool}: {source}")]
    Io {
        /// Tool name.
        tool: String,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Full diagnostic text, including captured streams.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}

fn failure_text(tool: &str, code: &Option<i32>, stdout: &str, stderr: &str) -> String {
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    format!(
        "{tool} execution failed (exit code {code}).\n--- Stderr ---\n{}\n--- Stdout ---\n{}",
        or_empty(stderr),
        or_empty(stdout)
    )
}

fn or_empty(stream: &str) -> &str {
    if stream.trim().is_empty() {
        "Empty"
    } else {
        stream
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// A single command invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program to run, looked up on `PATH` if not absolute.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env_vars: HashMap<String, String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Time limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: HashMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Run in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Bound the run time.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Short tool name for messages (the program's file name).
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Run the command to completion.
    pub async fn run(&self) -> Result<ToolOutput, ToolError> {
        let tool = self.tool_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            tool = %tool,
            args = ?self.args,
            timeout_s = self.timeout.map(|t| t.as_secs()),
            "Spawning tool process"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let completion = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_stream(&tool, "stdout", stdout),
                read_stream(&tool, "stderr", stderr)
            );
            status.map(|status| (status, stdout, stderr))
        };

        let finished = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, completion).await {
                Ok(result) => result,
                Err(_) => {
                    error!(tool = %tool, timeout_s = limit.as_secs(), "Tool process timed out, killing");
                    let _ = child.kill().await;
                    return Err(ToolError::Timeout {
                        tool,
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => completion.await,
        };

        let (status, stdout, stderr) = finished.map_err(|source| ToolError::Io {
            tool: tool.clone(),
            source,
        })?;
        let duration = start.elapsed();

        if !stderr.is_empty() {
            debug!(tool = %tool, stderr = %truncate(&stderr, LOG_STDERR_CHARS), "Tool stderr output");
        }

        if status.success() {
            info!(tool = %tool, elapsed_ms = duration.as_millis() as u64, "Tool completed");
            Ok(ToolOutput {
                stdout,
                stderr,
                duration,
            })
        } else {
            error!(
                tool = %tool,
                code = ?status.code(),
                elapsed_ms = duration.as_millis() as u64,
                stderr = %truncate(&stderr, LOG_STDERR_CHARS),
                "Tool failed"
            );
            Err(ToolError::Failed {
                tool,
                code: status.code(),
                stdout,
                stderr,
            })
        }
    }
}

/// Read a child stream to the end.
///
/// A read error is logged and noted in the returned text, so a failure
/// report never shows a stream as empty when it could not be read.
async fn read_stream<R>(tool: &str, name: &str, stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let read = stream.read_to_end(&mut buf).await;
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if let Err(e) = read {
        warn!(tool = %tool, stream = name, error = %e, "Failed to read tool output");
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("[{name} unreadable: {e}]"));
    }
    text
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let output = sh("echo converted").run().await.unwrap();
        assert_eq!(output.stdout.trim(), "converted");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_streams() {
        let err = sh("echo partial; echo 'bad input' >&2; exit 1")
            .run()
            .await
            .unwrap_err();

        match &err {
            ToolError::Failed {
                code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(*code, Some(1));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "bad input");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let text = err.diagnostic();
        assert!(text.starts_with("sh execution failed (exit code 1)."));
        assert!(text.contains("--- Stderr ---\nbad input"));
        assert!(text.contains("--- Stdout ---\npartial"));
    }

    #[tokio::test]
    async fn test_empty_streams_render_as_empty() {
        let err = sh("exit 3").run().await.unwrap_err();
        let text = err.diagnostic();
        assert!(text.contains("(exit code 3)"));
        assert!(text.contains("--- Stderr ---\nEmpty\n--- Stdout ---\nEmpty"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let start = Instant::now();
        let err = sh("sleep 5")
            .timeout(Some(Duration::from_millis(200)))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("pipe closed")))
        }
    }

    #[tokio::test]
    async fn test_unreadable_stream_is_not_reported_empty() {
        let text = read_stream("FBX2glTF", "stderr", Some(BrokenPipe)).await;
        assert!(text.contains("stderr unreadable: pipe closed"));

        let failure = failure_text("FBX2glTF", &Some(1), "", &text);
        assert!(!failure.contains("--- Stderr ---\nEmpty"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = Invocation::new("/nonexistent/cadhub-tool")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_env_and_working_dir_applied() {
        let dir = tempfile::tempdir().unwrap();
        let output = sh("printf '%s' \"$CADHUB_TEST\"; pwd >&2")
            .env("CADHUB_TEST", "value")
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout, "value");
        let reported = std::fs::canonicalize(output.stderr.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
