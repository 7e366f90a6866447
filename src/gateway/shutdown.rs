//! Shutdown flag and platform signal adapters.
//!
//! The flag is flipped exactly once, by the first interrupt or termination
//! signal; later signals are no-ops. Platform differences live entirely in
//! the signal adapters below; the rest of the gateway only ever sees the
//! [`ShutdownHandle`].

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Process-wide shutdown flag, shared by cloning.
///
/// Wraps a [`CancellationToken`]: the request is atomic, non-blocking and
/// idempotent, and the flag is never reset.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Flips the flag. Safe to call from any task, any number of times.
    pub fn request(&self) {
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}

/// Waits for the first interrupt/termination signal, then flips the
/// shutdown flag. Spawned once at startup; exits after the first signal.
pub async fn listen_for_signals(shutdown: ShutdownHandle) {
    wait_for_signal().await;
    info!("Shutdown signal received");
    shutdown.request();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            // Fallback: interrupt only.
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupt: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for interrupt: {}", e);
            }
        }
        _ = term.recv() => {}
    }
}

// Windows and other platforms: ctrl_c also covers console close, logoff
// and shutdown events delivered through the console control handler.
#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for interrupt: {}", e);
    }
}
