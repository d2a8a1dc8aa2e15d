use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::executor::{ExecutorRegistry, TaskContext};
use crate::proto::task_server::Task;
use crate::proto::{Method, TaskRequest, TaskResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Frames buffered between the executor and the transport.
const FRAME_BUFFER: usize = 128;

/// gRPC service dispatching task requests to registered executors.
///
/// Every per-request context is a child of `shutdown`, so cancelling that
/// token tears down in-flight tasks together with their subprocess groups.
pub struct TaskService {
    registry: Arc<ExecutorRegistry>,
    shutdown: CancellationToken,
}

impl TaskService {
    pub fn new(registry: Arc<ExecutorRegistry>, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }
}

/// Clamp the requested timeout: 0 means the server default, anything above
/// the hard maximum is capped.
fn effective_timeout(timeout_secs: i32) -> Duration {
    if timeout_secs <= 0 {
        return DEFAULT_TIMEOUT;
    }
    Duration::from_secs(timeout_secs as u64).min(MAX_TIMEOUT)
}

#[tonic::async_trait]
impl Task for TaskService {
    type RunStream = ReceiverStream<Result<TaskResponse, Status>>;

    async fn run(
        &self,
        request: Request<TaskRequest>,
    ) -> Result<Response<Self::RunStream>, Status> {
        let req = request.into_inner();
        let method = Method::try_from(req.method).unwrap_or(Method::Unspecified);
        let task_id = if req.run_task_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            req.run_task_id.clone()
        };

        let executor = self.registry.create(method).map_err(|_| {
            Status::invalid_argument(format!("unsupported method {}", method.as_str_name()))
        })?;

        let ctx = TaskContext::with_parent(&self.shutdown, effective_timeout(req.timeout));
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);

        // Cancel the task when its deadline passes or the caller goes away
        // (the receive half of the frame channel is dropped with the stream).
        let watchdog = {
            let ctx = ctx.clone();
            let frame_tx = frame_tx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(ctx.deadline()) => {}
                    _ = frame_tx.closed() => {}
                }
                ctx.cancel();
            })
        };

        tokio::spawn(async move {
            let result = executor.execute(&ctx, &req.method_params, frame_tx.clone()).await;
            watchdog.abort();

            let error = result.as_ref().err().map(|status| status.to_string());
            tracing::info!(
                task = "completed",
                method = method.as_str_name(),
                task_id = %task_id,
                error = ?error,
                "task completed"
            );

            if let Err(status) = result {
                // Terminal status for the caller; ignored if it already hung up.
                let _ = frame_tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(frame_rx)))
    }
}
