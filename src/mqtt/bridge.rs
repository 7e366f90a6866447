//! Telemetry bridge: broker deliveries in, backend forwards out.
//!
//! Runs inside the broker delivery task. Each delivered message is
//! truncated to the configured capacity, filtered by exact topic match,
//! and handed to the sink at most once. Messages on other topics produce
//! no side effects beyond a log line.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gateway::buffer;
use crate::gateway::TelemetrySink;

pub struct TelemetryBridge {
    telemetry_topic: String,
    max_body_size: usize,
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryBridge {
    pub fn new(telemetry_topic: String, max_body_size: usize, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            telemetry_topic,
            max_body_size,
            sink,
        }
    }

    /// Handles one delivered message. Exactly one forward attempt for a
    /// matching topic, zero for anything else; forward failures are logged
    /// and not retried.
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        info!("Message on topic '{}'", topic);

        if topic != self.telemetry_topic {
            debug!("Topic is not telemetry, ignoring");
            return;
        }

        let body = buffer::clamp(payload, self.max_body_size);
        if body.len() < payload.len() {
            warn!(
                "Telemetry payload truncated from {} to {} bytes",
                payload.len(),
                body.len()
            );
        }
        debug!("Telemetry received: {} bytes", body.len());

        if let Err(e) = self.sink.forward_telemetry(body.to_vec()).await {
            warn!("Failed to send telemetry to backend: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::BridgeError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        forwarded: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn forward_telemetry(&self, payload: Vec<u8>) -> Result<(), BridgeError> {
            self.forwarded.lock().unwrap().push(payload);
            Ok(())
        }
    }

    struct FailingSink {
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn forward_telemetry(&self, _payload: Vec<u8>) -> Result<(), BridgeError> {
            *self.attempts.lock().unwrap() += 1;
            Err(BridgeError::Backend("connection refused".to_string()))
        }
    }

    fn bridge_with(sink: Arc<dyn TelemetrySink>, capacity: usize) -> TelemetryBridge {
        TelemetryBridge::new("robot/telemetry".to_string(), capacity, sink)
    }

    #[tokio::test]
    async fn matching_topic_forwards_exactly_once() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge_with(sink.clone(), 1024);

        bridge.handle("robot/telemetry", br#"{"battery":42}"#).await;

        let forwarded = sink.forwarded.lock().unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0], br#"{"battery":42}"#);
    }

    #[tokio::test]
    async fn other_topics_produce_no_forwards() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge_with(sink.clone(), 1024);

        bridge.handle("robot/command", b"payload").await;
        bridge.handle("robot/telemetry/extra", b"payload").await;
        bridge.handle("", b"payload").await;

        assert!(sink.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_payload_is_truncated_to_capacity_minus_one() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge_with(sink.clone(), 8);

        let payload = [b'x'; 32];
        bridge.handle("robot/telemetry", &payload).await;

        let forwarded = sink.forwarded.lock().unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0], &payload[..7]);
    }

    #[tokio::test]
    async fn empty_payload_is_forwarded_as_empty() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = bridge_with(sink.clone(), 1024);

        bridge.handle("robot/telemetry", b"").await;

        let forwarded = sink.forwarded.lock().unwrap();
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded[0].is_empty());
    }

    #[tokio::test]
    async fn forward_failure_is_swallowed_and_not_retried() {
        let sink = Arc::new(FailingSink {
            attempts: Mutex::new(0),
        });
        let bridge = bridge_with(sink.clone(), 1024);

        bridge.handle("robot/telemetry", b"payload").await;
        bridge.handle("robot/telemetry", b"payload").await;

        // One attempt per delivery, no retries.
        assert_eq!(*sink.attempts.lock().unwrap(), 2);
    }
}
