//! Lifecycle coordinator with a statum state machine.
//!
//! Owns startup ordering and reverse-order teardown for the whole gateway.
//!
//! # State Machine
//!
//! ```text
//! NotStarted ──► Initializing ──► Running ──► Stopping ──► Stopped
//!                     │
//!                     └── any init failure unwinds acquired resources
//!                         and aborts startup (process exits non-zero)
//! ```
//!
//! Acquisition order is backend client, broker link, command listener;
//! teardown runs strictly in reverse. The coordinator's own task does no
//! work while running, it only watches the shutdown flag at a coarse
//! interval.

use std::sync::Arc;
use std::time::Duration;

use statum::{machine, state};
use thiserror::Error;
use tracing::{error, info};

use super::shutdown::ShutdownHandle;
use crate::config::GatewayConfig;
use crate::http::backend::BackendClient;
use crate::http::ingress::{self, IngressError, IngressServer, IngressState};
use crate::mqtt::client::{self, MqttLink, MqttWorker};
use crate::mqtt::error::MqttError;

#[state]
#[derive(Debug, Clone)]
pub enum GatewayState {
    NotStarted,   // Nothing acquired yet
    Initializing, // Acquiring resources in order
    Running,      // Waiting on the shutdown flag
    Stopping,     // Releasing resources in reverse order
    Stopped,      // Everything released
}

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("MQTT init failed: {0}")]
    Mqtt(#[from] MqttError),

    #[error("HTTP server init failed: {0}")]
    Ingress(#[from] IngressError),
}

/// The gateway lifecycle. Resources are held in `Option`s so they can be
/// acquired during initialization and released one by one during teardown.
#[machine]
pub struct Gateway<S: GatewayState> {
    config: GatewayConfig,
    shutdown: ShutdownHandle,
    backend: Option<Arc<BackendClient>>,
    mqtt: Option<Arc<MqttLink>>,
    mqtt_worker: Option<MqttWorker>,
    ingress: Option<IngressServer>,
}

impl Gateway<NotStarted> {
    pub fn create(config: GatewayConfig, shutdown: ShutdownHandle) -> Self {
        Self::new(config, shutdown, None, None, None, None)
    }

    /// Acquires everything in order. On failure, resources acquired so far
    /// are released in reverse before the error is returned; a partially
    /// running gateway is never observable.
    pub async fn initialize(self) -> Result<Gateway<Running>, GatewayError> {
        info!("Starting...");
        let mut this: Gateway<Initializing> = self.transition();

        let backend = Arc::new(BackendClient::new(this.config.http.backend_url.clone()));

        let (link, worker) = match client::connect(
            &this.config.broker,
            this.config.limits.max_body_size,
            backend.clone(),
        )
        .await
        {
            Ok(pair) => pair,
            Err(e) => {
                error!("MQTT init failed: {}", e);
                drop(backend);
                return Err(e.into());
            }
        };

        let ingress_state = IngressState {
            sink: link.clone(),
            command_path: this.config.http.command_path.clone(),
            max_body_size: this.config.limits.max_body_size,
        };
        let server = match ingress::start(this.config.http.listen_port, ingress_state).await {
            Ok(server) => server,
            Err(e) => {
                error!("HTTP server init failed: {}", e);
                link.disconnect().await;
                worker.stop().await;
                drop(backend);
                return Err(e.into());
            }
        };

        this.backend = Some(backend);
        this.mqtt = Some(link);
        this.mqtt_worker = Some(worker);
        this.ingress = Some(server);

        Ok(this.transition())
    }
}

impl Gateway<Running> {
    /// Blocks until shutdown is requested. All actual work happens on the
    /// listener and delivery tasks; this loop only watches the flag.
    pub async fn run_until_shutdown(self) -> Gateway<Stopping> {
        info!("Running. Press Ctrl+C to exit.");

        loop {
            tokio::select! {
                _ = self.shutdown.requested() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }

        info!("Shutting down...");
        self.transition()
    }
}

impl Gateway<Stopping> {
    /// Releases resources in strict reverse acquisition order: listener,
    /// broker link, HTTP client. Runs exactly once.
    pub async fn stop(mut self) -> Gateway<Stopped> {
        if let Some(server) = self.ingress.take() {
            server.stop().await;
        }
        if let Some(link) = self.mqtt.take() {
            link.disconnect().await;
        }
        if let Some(worker) = self.mqtt_worker.take() {
            worker.stop().await;
        }
        self.backend.take();

        info!("Shutdown complete");
        self.transition()
    }
}

impl Gateway<Stopped> {}
