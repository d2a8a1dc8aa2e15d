use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::executor::ExecutorRegistry;
use crate::grpc::task_service::TaskService;
use crate::proto::task_server::TaskServer;

pub struct GrpcServer {
    addr: SocketAddr,
    registry: Arc<ExecutorRegistry>,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, registry: Arc<ExecutorRegistry>) -> Self {
        Self { addr, registry }
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let task_service = TaskService::new(self.registry, shutdown.clone());

        tracing::info!(addr = %self.addr, "starting gRPC server");

        Server::builder()
            .add_service(TaskServer::new(task_service))
            .serve_with_shutdown(self.addr, async move {
                shutdown.cancelled().await;
                tracing::info!("gRPC server draining");
            })
            .await
    }
}
