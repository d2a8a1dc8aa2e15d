pub mod server;
pub mod task_service;

pub use server::GrpcServer;
pub use task_service::TaskService;
