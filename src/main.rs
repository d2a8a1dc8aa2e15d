use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use task_agent::config::{self, AgentConfig};
use task_agent::executor::default_registry;
use task_agent::grpc::GrpcServer;
use task_agent::security::CommandValidator;
use task_agent::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "task-agent")]
#[command(about = "A worker agent that runs scheduler-submitted shell tasks")]
struct Args {
    /// Path to the application config (defaults to <config dir>/agent.yaml)
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "task-agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> task_agent::error::Result<()> {
    let config_path = args
        .config
        .unwrap_or_else(|| config::config_dir().join("agent.yaml"));
    let config = AgentConfig::load(&config_path)?;

    // Strict mode: a worker that cannot load its security policy must not
    // serve requests.
    let validator = Arc::new(CommandValidator::new(config.security_config_path())?);
    let registry = Arc::new(default_registry(validator));

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        methods = ?registry
            .supported()
            .iter()
            .map(|m| m.as_str_name())
            .collect::<Vec<_>>(),
        "starting task-agent"
    );

    let shutdown = install_shutdown_handler();
    GrpcServer::new(config.server.listen_addr, registry)
        .run(shutdown)
        .await?;

    tracing::info!("task-agent stopped");
    Ok(())
}
