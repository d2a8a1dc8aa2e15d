use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("config error: {0}")]
    Config(String),

    #[error("security config error: {0}")]
    Security(String),

    #[error("unsupported executor method: {0}")]
    UnsupportedMethod(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
