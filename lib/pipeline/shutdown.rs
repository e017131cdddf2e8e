use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Process-wide shutdown flag.
///
/// Set once by the signal listener or by a fatal failure; read by the executor (stop
/// admitting work) and the orchestrator (skip redo, report interruption). Clones share the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    token: CancellationToken,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been signalled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Waits for SIGINT or SIGTERM and requests a cooperative shutdown.
///
/// In-flight engine calls are left to finish; only new submissions stop.
#[cfg(unix)]
pub async fn listen_for_shutdown_signals(shutdown: ShutdownToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!(
                event = "signal_received",
                signal = "SIGTERM",
                "SIGTERM received, shutting down."
            );
        }
        _ = sigint.recv() => {
            info!(
                event = "signal_received",
                signal = "SIGINT",
                "SIGINT received, shutting down."
            );
        }
        _ = shutdown.cancelled() => {
            return Ok(());
        }
    }

    warn!(
        event = "shutdown_requested",
        "Please wait for running tasks to complete, this could take many minutes..."
    );
    shutdown.signal_shutdown();
    Ok(())
}

#[cfg(not(unix))]
pub async fn listen_for_shutdown_signals(shutdown: ShutdownToken) -> std::io::Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!(
                event = "signal_received",
                signal = "ctrl_c",
                "Interrupt received, shutting down."
            );
        }
        _ = shutdown.cancelled() => {
            return Ok(());
        }
    }

    warn!(
        event = "shutdown_requested",
        "Please wait for running tasks to complete, this could take many minutes..."
    );
    shutdown.signal_shutdown();
    Ok(())
}
