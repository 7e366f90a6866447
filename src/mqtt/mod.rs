//! # MQTT Integration Module
//!
//! The gateway's side of the broker connection: a single `rumqttc` client
//! shared by both bridging flows. Commands accepted over HTTP are published
//! on the command topic; telemetry arriving on the telemetry topic is
//! handed to the backend forwarder.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── bridge.rs - telemetry topic filter and forward-once logic
//! ├── client.rs - broker link, delivery loop task, command publishing
//! └── error.rs  - error definitions
//! ```
//!
//! ## Delivery Context
//!
//! The broker client's background delivery loop runs as one tokio task
//! (spawned in `client::connect`). The telemetry bridge, and the backend
//! POST inside it, run synchronously on that task: a slow backend delays
//! subsequent message deliveries. Publishes from the HTTP listener tasks
//! go through the same client concurrently; `rumqttc`'s client handle is
//! safe for that without external locking.

pub mod bridge;
pub mod client;
pub mod error;
