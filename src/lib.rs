pub mod config;
pub mod error;
pub mod executor;
pub mod grpc;
pub mod security;
pub mod shutdown;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("task");
}
