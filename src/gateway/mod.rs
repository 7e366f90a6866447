//! # Gateway Core
//!
//! The bridging core between the MQTT broker and the HTTP backend. Two
//! independent flows run through this module's contracts:
//!
//! ```text
//! HTTP client ──► Command Ingress ──► CommandSink ──► broker (robot/command)
//! broker (robot/telemetry) ──► Telemetry Bridge ──► TelemetrySink ──► HTTP backend
//! ```
//!
//! The flows share no data. They share only the broker link behind
//! [`CommandSink`] and the process-wide shutdown flag owned by the
//! lifecycle coordinator.
//!
//! ## Module Architecture
//!
//! ```text
//! gateway/
//! ├── buffer.rs    - fixed-capacity payload accumulation with truncation
//! ├── lifecycle.rs - startup ordering, wait loop, reverse-order teardown
//! └── shutdown.rs  - shutdown flag and platform signal adapters
//! ```
//!
//! The two sink traits below are the seams between the transports: the
//! ingress only knows how to hand a finished command payload to *some*
//! publisher, and the telemetry bridge only knows how to hand a payload to
//! *some* forwarder. Tests substitute recording sinks; production wires
//! the MQTT link and the backend client in.

pub mod buffer;
pub mod lifecycle;
pub mod shutdown;

use async_trait::async_trait;
use thiserror::Error;

/// Failure crossing one of the two transport boundaries.
///
/// Carried back to the immediate caller and logged; never retried and
/// never escalated to process termination.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The broker client did not accept the payload into its send path.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The backend POST failed at the transport level.
    #[error("Backend request failed: {0}")]
    Backend(String),

    /// The backend answered outside the 2xx range.
    #[error("Backend returned status {0}")]
    BackendStatus(u16),
}

/// Accepts one completed command payload for publication on the command
/// topic. Implementations must be safe for concurrent invocation from
/// multiple listener tasks.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn publish_command(&self, payload: Vec<u8>) -> Result<(), BridgeError>;
}

/// Accepts one telemetry payload for delivery to the backend. Called
/// synchronously from the broker delivery task, one payload at a time.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn forward_telemetry(&self, payload: Vec<u8>) -> Result<(), BridgeError>;
}
