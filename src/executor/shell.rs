//! Shell command executor.
//!
//! Runs `/bin/bash -c <command>` in its own process group and streams each
//! line of stdout and stderr back as a response frame. Five cooperating
//! activities share one cancellation scope:
//!
//! - two readers line-scan the subprocess pipes into bounded channels,
//! - the sender forwards lines from both channels to the response stream,
//! - the reaper watches for cancellation or a send failure and kills the
//!   whole process group,
//! - the waiter reaps the subprocess exit status.
//!
//! The executor returns only after every activity has finished, so no task,
//! pipe or child process outlives a request. Backpressure is end-to-end: a
//! slow client fills the channels, which blocks the readers, which blocks the
//! subprocess on its pipe writes.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::executor::{Executor, FrameSink, TaskContext};
use crate::proto::task_response::Content;
use crate::proto::TaskResponse;
use crate::security::CommandValidator;

/// Capacity of each per-stream line channel.
const BUF_SIZE: usize = 1000;

pub struct ShellExecutor {
    validator: Option<Arc<CommandValidator>>,
}

impl ShellExecutor {
    pub fn new(validator: Arc<CommandValidator>) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// An executor with no validator attached; commands run as given.
    pub fn unvalidated() -> Self {
        Self { validator: None }
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        command: &str,
        stream: FrameSink,
    ) -> Result<(), Status> {
        let mut command = command.trim().to_string();
        if command.is_empty() {
            return Err(Status::invalid_argument("empty command"));
        }

        if let Some(validator) = &self.validator {
            if validator.is_enabled() {
                let verdict = validator.validate(&command);
                if !verdict.valid {
                    return Err(Status::permission_denied(format!(
                        "command not allowed: {}",
                        verdict.reason
                    )));
                }
                if !verdict.normalized_command.is_empty() {
                    command = verdict.normalized_command;
                }
            }
        }

        // Own process group, so one signal to -pid reaches the whole subtree.
        let mut child = Command::new("/bin/bash")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| Status::internal(format!("start command failed: {}", e)))?;

        let pid = child.id().map(|id| id as i32).unwrap_or(0);

        let Some(stdout) = child.stdout.take() else {
            kill_process_group(pid);
            return Err(Status::internal("failed to get stdout pipe"));
        };
        let Some(stderr) = child.stderr.take() else {
            kill_process_group(pid);
            return Err(Status::internal("failed to get stderr pipe"));
        };

        let g_cancel = ctx.cancel_token().child_token();

        let (out_tx, out_rx) = mpsc::channel::<String>(BUF_SIZE);
        let (err_tx, err_rx) = mpsc::channel::<String>(BUF_SIZE);
        let (send_err_tx, send_err_rx) = oneshot::channel::<Option<String>>();

        let reader_out = spawn_reader(stdout, "stdout", out_tx, g_cancel.clone());
        let reader_err = spawn_reader(stderr, "stderr", err_tx, g_cancel.clone());
        let sender = spawn_sender(stream, out_rx, err_rx, send_err_tx);

        let reaper = {
            let cancel = g_cancel.clone();
            let task_ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        kill_process_group(pid);
                        Err(Status::internal(format!(
                            "command canceled or timeout: {}",
                            task_ctx.cancel_reason()
                        )))
                    }
                    outcome = send_err_rx => match outcome {
                        Ok(Some(e)) => {
                            cancel.cancel();
                            kill_process_group(pid);
                            Err(Status::internal(format!("failed to send output: {}", e)))
                        }
                        Ok(None) => Ok(()),
                        // Sender vanished without reporting; the waiter still
                        // settles the request.
                        Err(_) => Ok(()),
                    }
                }
            })
        };

        let waiter = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => {
                    tracing::warn!(%status, "command exited with error");
                    Err(Status::internal(format!(
                        "command exited with error: {}",
                        status
                    )))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait for command");
                    Err(Status::internal(format!(
                        "command exited with error: {}",
                        e
                    )))
                }
            }
        });

        let (out_join, err_join, sender_join, reaper_join, waiter_join) =
            tokio::join!(reader_out, reader_err, sender, reaper, waiter);
        for join in [out_join, err_join, sender_join] {
            if let Err(e) = join {
                tracing::warn!(error = %e, "task activity panicked");
            }
        }

        flatten_join(reaper_join).and(flatten_join(waiter_join))
    }
}

fn flatten_join(
    join: Result<Result<(), Status>, tokio::task::JoinError>,
) -> Result<(), Status> {
    match join {
        Ok(inner) => inner,
        Err(e) => {
            tracing::warn!(error = %e, "task activity panicked");
            Err(Status::internal(format!("task activity failed: {}", e)))
        }
    }
}

/// Line-scan one subprocess pipe into its channel. The channel closes when
/// this task exits, on EOF, cancellation, or a dropped receiver. A read error
/// other than EOF is reported in-band as a synthetic line.
fn spawn_reader<R>(
    source: R,
    label: &'static str,
    lines_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = lines.next_line() => next,
            };
            match next {
                Ok(Some(line)) => {
                    // Bounded enqueue; blocks when the sender lags, which in
                    // turn blocks the subprocess on its pipe write.
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = lines_tx.send(line) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(stream = label, error = %e, "subprocess read error");
                    let _ = lines_tx.send(format!("{} read error: {}", label, e)).await;
                    return;
                }
            }
        }
    })
}

/// Forward lines from both channels to the response stream. Posts the first
/// send failure, or `None` after a clean drain, into the reaper's slot.
fn spawn_sender(
    stream: FrameSink,
    out_rx: mpsc::Receiver<String>,
    err_rx: mpsc::Receiver<String>,
    send_err_tx: oneshot::Sender<Option<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut out_rx = Some(out_rx);
        let mut err_rx = Some(err_rx);
        let mut failure: Option<String> = None;

        while failure.is_none() && (out_rx.is_some() || err_rx.is_some()) {
            tokio::select! {
                line = recv_or_closed(&mut out_rx) => match line {
                    Some(line) => {
                        let frame = TaskResponse {
                            content: Some(Content::Output(line)),
                        };
                        if let Err(e) = stream.send(Ok(frame)).await {
                            tracing::warn!(error = %e, "failed to send stdout frame");
                            failure = Some(e.to_string());
                        }
                    }
                    None => out_rx = None,
                },
                line = recv_or_closed(&mut err_rx) => match line {
                    Some(line) => {
                        let frame = TaskResponse {
                            content: Some(Content::Error(line)),
                        };
                        if let Err(e) = stream.send(Ok(frame)).await {
                            tracing::warn!(error = %e, "failed to send stderr frame");
                            failure = Some(e.to_string());
                        }
                    }
                    None => err_rx = None,
                },
            }
        }

        let _ = send_err_tx.send(failure);
    })
}

/// Receive from a channel that may already be retired; a retired channel
/// never resolves, so its select branch goes quiet.
async fn recv_or_closed(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Kill the whole process group. The child was spawned with
/// `process_group(0)`, so its pid doubles as the group id. A vanished group
/// is success; other syscall errors are logged and swallowed.
fn kill_process_group(pid: i32) {
    if pid <= 0 {
        return;
    }
    let ret = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if ret == 0 {
        tracing::info!(pid, "process group killed");
    } else {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pid, error = %err, "failed to kill process group");
        }
    }
}
