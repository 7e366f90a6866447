//! Error definitions for the broker link.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    /// Connecting to the broker failed or the broker refused the session.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The telemetry topic subscription was not accepted.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// The client did not accept the payload into its send path.
    #[error("Publish failed: {0}")]
    Publish(String),
}
