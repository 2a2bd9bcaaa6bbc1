//! Signal handling for graceful shutdown

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, warn};

/// Resolves once SIGTERM or SIGINT arrives
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for a shutdown signal
    pub async fn wait(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
            }
        }
    }
}

/// Wait for a signal, falling back to ctrl-c when handlers cannot be registered
pub async fn wait_for_shutdown(signal: io::Result<ShutdownSignal>) {
    match signal {
        Ok(mut signal) => signal.wait().await,
        Err(e) => {
            warn!(?e, "failed to register signal handlers, watching ctrl-c only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(?e, "ctrl-c handler failed");
                std::future::pending::<()>().await;
            }
        }
    }
}
