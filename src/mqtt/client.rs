//! Broker link: connection setup, background delivery loop, publishing.
//!
//! `connect` blocks until the broker acknowledges the session, then spawns
//! the delivery loop and subscribes to the telemetry topic. The returned
//! [`MqttLink`] is the process-wide client handle; it may publish from any
//! task concurrently with inbound delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bridge::TelemetryBridge;
use super::error::MqttError;
use crate::config::BrokerConfig;
use crate::gateway::{BridgeError, CommandSink, TelemetrySink};

const CLIENT_ID: &str = "OpenGateway";

/// Request queue capacity between the client handle and the event loop.
const CLIENT_CHANNEL_CAPACITY: usize = 100;

/// Publishing half of the broker connection.
pub struct MqttLink {
    client: AsyncClient,
    command_topic: String,
}

/// Background delivery loop task. Stopped once, during teardown.
pub struct MqttWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Connects to the broker, starts the delivery loop and subscribes to the
/// telemetry topic. Fails without leaving anything running.
pub async fn connect(
    config: &BrokerConfig,
    max_body_size: usize,
    sink: Arc<dyn TelemetrySink>,
) -> Result<(Arc<MqttLink>, MqttWorker), MqttError> {
    let mut options = MqttOptions::new(CLIENT_ID, config.host.as_str(), config.port);
    options
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
        .set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);

    info!("Connecting to {}:{}", config.host, config.port);
    wait_for_connack(&mut eventloop).await?;

    let bridge = TelemetryBridge::new(config.telemetry_topic.clone(), max_body_size, sink);
    let token = CancellationToken::new();
    let handle = tokio::spawn(deliver_messages(eventloop, bridge, token.clone()));

    if let Err(e) = client
        .subscribe(config.telemetry_topic.as_str(), QoS::AtLeastOnce)
        .await
    {
        let error = MqttError::Subscribe(format!("{}: {}", config.telemetry_topic, e));
        let _ = client.disconnect().await;
        token.cancel();
        let _ = handle.await;
        return Err(error);
    }
    info!("Subscribed to {}", config.telemetry_topic);

    let link = Arc::new(MqttLink {
        client,
        command_topic: config.command_topic.clone(),
    });
    Ok((link, MqttWorker { token, handle }))
}

/// Polls until the broker accepts or refuses the session.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), MqttError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to broker");
                    return Ok(());
                }
                return Err(MqttError::Connection(format!(
                    "broker refused session: {:?}",
                    ack.code
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(MqttError::Connection(e.to_string())),
        }
    }
}

/// Delivery loop. Each publish delivered by the broker runs through the
/// bridge on this task, one at a time, in delivery order.
async fn deliver_messages(mut eventloop: EventLoop, bridge: TelemetryBridge, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    bridge.handle(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    warn!("Connection error: {}", e);
                    // The next poll re-establishes the connection.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    debug!("Delivery loop stopped");
}

impl MqttLink {
    /// Single publish to the command topic. Success means the client
    /// accepted the payload into its send path, not end-to-end delivery.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), MqttError> {
        let len = payload.len();
        self.client
            .publish(self.command_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))?;
        info!("Published {} bytes to {}", len, self.command_topic);
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    }
}

#[async_trait]
impl CommandSink for MqttLink {
    async fn publish_command(&self, payload: Vec<u8>) -> Result<(), BridgeError> {
        self.publish(payload)
            .await
            .map_err(|e| BridgeError::Publish(e.to_string()))
    }
}

impl MqttWorker {
    /// Stops the delivery loop and waits for the task to finish. The
    /// in-flight bridge call, if any, completes first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Delivery task join failed: {}", e);
        }
    }
}
