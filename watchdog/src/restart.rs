use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::types::{RestartInvocation, RestartReason};

/// Corrective action issued when the node is unregistered or lagging.
///
/// Implementations must not wait for the node to come back: whether the
/// restart worked is only observed by the next cycle. Any follow-up work
/// (reaping the child, logging its exit) goes on `tasks`.
pub trait Restarter: Send + Sync {
    fn restart(&self, reason: RestartReason, tasks: &TaskTracker) -> RestartInvocation;
}

/// Runs a configured argv, e.g. `systemctl restart node`, without a shell.
pub struct CommandRestarter {
    argv: Vec<String>,
    timeout: Duration,
    dry_run: bool,
}

impl CommandRestarter {
    pub fn new(argv: Vec<String>, timeout: Duration, dry_run: bool) -> Self {
        Self {
            argv,
            timeout,
            dry_run,
        }
    }

    fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

impl Restarter for CommandRestarter {
    fn restart(&self, reason: RestartReason, tasks: &TaskTracker) -> RestartInvocation {
        let Some((program, args)) = self.argv.split_first() else {
            return RestartInvocation::Failed("restart command is empty".to_string());
        };

        if self.dry_run {
            info!("Dry run: would run `{}` ({})", self.command_line(), reason);
            return RestartInvocation::DryRun;
        }

        info!("Running restart command `{}` ({})", self.command_line(), reason);

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to run restart command `{}`: {}", self.command_line(), e);
                return RestartInvocation::Failed(e.to_string());
            }
        };

        let pid = child.id();
        let timeout = self.timeout;
        let command_line = self.command_line();
        tasks.spawn(reap(child, command_line, timeout));

        RestartInvocation::Spawned { pid }
    }
}

/// How long stderr is still drained after the command exited. A background
/// process started by the command can hold the pipe open indefinitely.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// How a spawned restart command ended.
#[derive(Debug)]
enum Reaped {
    Exited { status: ExitStatus, stderr: String },
    WaitFailed(io::Error),
    Killed,
}

/// Wait for a restart command, killing it after `timeout`, and log how it
/// ended.
async fn reap(mut child: Child, command_line: String, timeout: Duration) -> Reaped {
    let stderr = child.stderr.take();
    let read_stderr = async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                debug!("Reading restart command stderr failed: {}", e);
            }
        }
        buf
    };
    tokio::pin!(read_stderr);

    // Drain stderr while waiting so a chatty command cannot block on a full pipe
    let mut captured = None;
    let waited = tokio::time::timeout(timeout, async {
        loop {
            tokio::select! {
                status = child.wait() => break status,
                buf = &mut read_stderr, if captured.is_none() => captured = Some(buf),
            }
        }
    })
    .await;

    let reaped = match waited {
        Ok(Ok(status)) => {
            let buf = match captured {
                Some(buf) => buf,
                None => tokio::time::timeout(STDERR_GRACE, &mut read_stderr)
                    .await
                    .unwrap_or_default(),
            };
            Reaped::Exited {
                status,
                stderr: String::from_utf8_lossy(&buf).trim().to_string(),
            }
        }
        Ok(Err(e)) => Reaped::WaitFailed(e),
        Err(_) => {
            warn!(
                "Restart command `{}` still running after {}s, killing it",
                command_line,
                timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                debug!("Kill failed: {}", e);
            }
            Reaped::Killed
        }
    };

    match &reaped {
        Reaped::Exited { status, .. } if status.success() => {
            info!("Restart command `{}` exited successfully", command_line);
        }
        Reaped::Exited { status, stderr } => {
            warn!("Restart command `{}` exited with {}: {}", command_line, status, stderr);
        }
        Reaped::WaitFailed(e) => {
            warn!("Failed to wait for restart command `{}`: {}", command_line, e);
        }
        Reaped::Killed => {}
    }
    reaped
}
