// Command Executor Port
// Abstraction for running one shell command with a hard timeout and cancellation

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use tokio_util::sync::CancellationToken;

/// Outcome of one command run
///
/// A non-zero exit is not an error at this level: listing commands may exit
/// non-zero and still print something meaningful, so the caller decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// stdout then stderr, newline-joined
    pub output: String,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub duration_ms: i64,
}

impl CommandOutcome {
    /// Zero exit, not timed out, not cancelled
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    /// Short reason string for logs and job messages
    pub fn describe(&self) -> String {
        if self.cancelled {
            "cancelled".to_string()
        } else if self.timed_out {
            format!("timed out after {}ms", self.duration_ms)
        } else {
            match self.exit_code {
                Some(code) => format!("exit={}", code),
                None => "killed by signal".to_string(),
            }
        }
    }
}

/// Execution errors (the command could not be run or reaped at all)
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process kill failed: {0}")]
    Killed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Executor trait
///
/// Implementations:
/// - ShellExecutor (infra-system): `bash -c <command>` via tokio::process
/// - MockCommandExecutor: scripted outputs for tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion, timeout, or cancellation.
    ///
    /// `timeout` of zero disables the deadline. When the deadline passes or
    /// `cancel` fires, the process is killed (no graceful negotiation) and
    /// reaped before this returns.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the process cannot be started
    /// - ExecutionError::IoError if waiting on the process fails
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<CommandOutcome, ExecutionError>;
}

/// Join captured stdout and stderr the way callers expect to see them
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    format!(
        "{}\n{}",
        stdout.trim_end_matches('\n'),
        stderr.trim_end_matches('\n')
    )
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;

    /// Canned response for commands starting with `prefix`
    #[derive(Debug, Clone)]
    struct Script {
        prefix: String,
        output: String,
        exit_code: i32,
        delay: Duration,
    }

    /// Mock Command Executor for testing
    ///
    /// The most recently registered matching script wins, so tests can
    /// override a response halfway through. Unmatched commands exit 127.
    #[derive(Default)]
    pub struct MockCommandExecutor {
        scripts: Mutex<Vec<Script>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockCommandExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond immediately to commands starting with `prefix`
        pub fn script(&self, prefix: impl Into<String>, output: impl Into<String>, exit_code: i32) {
            self.script_delayed(prefix, output, exit_code, Duration::ZERO);
        }

        /// Respond after `delay` (subject to timeout and cancellation)
        pub fn script_delayed(
            &self,
            prefix: impl Into<String>,
            output: impl Into<String>,
            exit_code: i32,
            delay: Duration,
        ) {
            self.scripts.lock().push(Script {
                prefix: prefix.into(),
                output: output.into(),
                exit_code,
                delay,
            });
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn lookup(&self, command: &str) -> Option<Script> {
            self.scripts
                .lock()
                .iter()
                .rev()
                .find(|s| command.starts_with(&s.prefix))
                .cloned()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(
            &self,
            command: &str,
            timeout: Duration,
            cancel: CancellationToken,
        ) -> Result<CommandOutcome, ExecutionError> {
            self.calls.lock().push(command.to_string());

            let script = self.lookup(command).unwrap_or(Script {
                prefix: String::new(),
                output: format!("{}: command not found", command),
                exit_code: 127,
                delay: Duration::ZERO,
            });

            let started = tokio::time::Instant::now();
            let deadline = async {
                if timeout.is_zero() {
                    std::future::pending::<()>().await
                } else {
                    tokio::time::sleep(timeout).await
                }
            };

            let (timed_out, cancelled) = tokio::select! {
                _ = tokio::time::sleep(script.delay) => (false, false),
                _ = deadline => (true, false),
                _ = cancel.cancelled() => (false, true),
            };

            let finished = !timed_out && !cancelled;
            Ok(CommandOutcome {
                output: if finished { script.output } else { String::new() },
                exit_code: if finished { Some(script.exit_code) } else { None },
                timed_out,
                cancelled,
                duration_ms: started.elapsed().as_millis() as i64,
            })
        }
    }
}
