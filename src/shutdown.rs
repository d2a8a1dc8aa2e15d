use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns the agent's root `CancellationToken`. Cancelling it stops the gRPC
/// server from accepting new `Task.Run` calls, and because every in-flight
/// task context is a child of this token, each shell executor's reaper kills
/// its subprocess group instead of leaving work running behind a dying agent.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!(signal = "SIGTERM", "shutdown requested, cancelling in-flight tasks");
            }
            _ = sigint.recv() => {
                tracing::info!(signal = "SIGINT", "shutdown requested, cancelling in-flight tasks");
            }
        }

        token_clone.cancel();
    });

    token
}
