// Shell command executor
// reason: tokio for async process management, nix for process-group kill
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use backy_core::port::{
    combine_output, CancellationToken, CommandExecutor, CommandOutcome, ExecutionError,
};

/// Shell used to interpret command strings
pub const DEFAULT_SHELL: &str = "bash";

/// How long to keep reading output after the process is gone
/// (a detached grandchild may still hold the pipe)
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

enum Stop {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs `<shell> -c <command>` in its own process group.
///
/// Timeout and cancellation SIGKILL the whole group: backy2 and friends are
/// not guaranteed to trap signals, so there is no SIGTERM grace period.
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn spawn(&self, command: &str) -> Result<Child, ExecutionError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", self.shell, e)))
    }

    /// SIGKILL the process group, then the child itself as a fallback
    fn kill_hard(child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = %pid, error = %e, "SIGKILL to process group failed"),
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Child already gone when killing");
        }
    }

    async fn reap(child: &mut Child) -> Result<ExitStatus, ExecutionError> {
        child
            .wait()
            .await
            .map_err(|e| ExecutionError::IoError(e.to_string()))
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<CommandOutcome, ExecutionError> {
        let started = Instant::now();
        info!(
            command = %command,
            timeout_ms = %timeout.as_millis(),
            "Starting command execution"
        );

        let mut child = self.spawn(command)?;
        let stdout = stream_lines(child.stdout.take());
        let stderr = stream_lines(child.stderr.take());

        // Deadline is fixed at launch
        let deadline = async {
            if timeout.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep_until(started + timeout).await
            }
        };

        let stop = tokio::select! {
            status = child.wait() => {
                Stop::Exited(status.map_err(|e| ExecutionError::IoError(e.to_string()))?)
            }
            _ = deadline => Stop::TimedOut,
            _ = cancel.cancelled() => Stop::Cancelled,
        };

        let (status, timed_out, cancelled) = match stop {
            Stop::Exited(status) => (status, false, false),
            Stop::TimedOut => {
                warn!(command = %command, "Stopping command execution because it is taking too long");
                Self::kill_hard(&mut child);
                (Self::reap(&mut child).await?, true, false)
            }
            Stop::Cancelled => {
                info!(command = %command, "Stopping command execution on request");
                Self::kill_hard(&mut child);
                (Self::reap(&mut child).await?, false, true)
            }
        };

        let drain_deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        let stdout = drain(stdout, drain_deadline).await;
        let stderr = drain(stderr, drain_deadline).await;

        let outcome = CommandOutcome {
            output: combine_output(&stdout, &stderr),
            exit_code: status.code(),
            timed_out,
            cancelled,
            duration_ms: started.elapsed().as_millis() as i64,
        };

        info!(
            command = %command,
            duration_ms = %outcome.duration_ms,
            exit_code = ?outcome.exit_code,
            timed_out = %timed_out,
            cancelled = %cancelled,
            "Command execution completed"
        );
        debug!(output = %outcome.output, "Command output");

        Ok(outcome)
    }
}

/// Forward a pipe line by line so output survives a truncated drain
fn stream_lines<R>(pipe: Option<R>) -> mpsc::UnboundedReceiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(pipe) = pipe {
        tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(|c| c == '\n' || c == '\r')
                            .to_string();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Output pipe read failed");
                        break;
                    }
                }
            }
        });
    }
    rx
}

async fn drain(mut lines: mpsc::UnboundedReceiver<String>, deadline: Instant) -> String {
    let mut collected = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, lines.recv()).await {
            Ok(Some(line)) => collected.push(line),
            Ok(None) => break,
            Err(_) => {
                warn!("Output pipe still open after process exit; output truncated");
                break;
            }
        }
    }
    collected.join("\n")
}
