//! Task execution engine.
//!
//! An [`Executor`] runs one task and writes its output as frames to the
//! response stream. Executors are looked up by method tag in the
//! [`ExecutorRegistry`], which is populated once at startup
//! ([`default_registry`]) and read-only afterwards.

pub mod registry;
pub mod shell;

pub use registry::{default_registry, ExecutorRegistry};
pub use shell::ShellExecutor;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tonic::Status;

use crate::proto::TaskResponse;

/// One streamed response frame; a trailing `Err` carries the terminal status.
pub type Frame = std::result::Result<TaskResponse, Status>;

/// Send side of the per-request response stream.
pub type FrameSink = tokio::sync::mpsc::Sender<Frame>;

/// Per-task cancellation scope: a token cancelled on timeout or shutdown,
/// plus the deadline that distinguishes the two when reporting.
#[derive(Debug, Clone)]
pub struct TaskContext {
    cancel: CancellationToken,
    deadline: Instant,
}

impl TaskContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Instant::now() + timeout,
        }
    }

    /// A context whose cancellation chains from `parent`, so agent shutdown
    /// cancels every in-flight task along with its subprocess group.
    pub fn with_parent(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Why the task was cancelled, judged against the deadline.
    pub fn cancel_reason(&self) -> &'static str {
        if Instant::now() >= self.deadline {
            "deadline exceeded"
        } else {
            "canceled"
        }
    }
}

/// A pluggable handler for one method tag.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the task described by `command`, streaming output frames into
    /// `stream` until the task finishes or `ctx` is cancelled.
    async fn execute(&self, ctx: &TaskContext, command: &str, stream: FrameSink)
        -> std::result::Result<(), Status>;
}
