//! Command ingress: the HTTP listener that turns POST bodies into broker
//! publishes.
//!
//! Every request runs through a single catch-all handler, mirroring the
//! one-callback shape of the underlying daemon: chunks are accumulated
//! into a bounded buffer as they arrive, and the method/path gate is
//! evaluated when the body ends, so a bad request is rejected even when
//! its body was empty.
//!
//! # Request Assembly
//!
//! Body accumulation is an explicit state machine with a pure transition
//! function, so the truncation and rejection policies are testable without
//! a network stack:
//!
//! ```text
//! Idle ──Open──► Accumulating ──Chunk──► Accumulating
//!                     │
//!                    End──► Complete (publish)  |  Rejected (404)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::gateway::buffer::BoundedBuffer;
use crate::gateway::CommandSink;

const ACCEPTED: &str = "Command accepted";
const PUBLISH_FAILED: &str = "Failed to publish command";
const NOT_FOUND: &str = "Not found";

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Per-request assembly states.
#[derive(Debug)]
pub enum AssemblyState {
    Idle,
    Accumulating { matched: bool, buffer: BoundedBuffer },
    Complete,
    Rejected,
}

/// Delivery events for one request. `Open` carries whether the request
/// targets the command endpoint; the gate itself fires on `End`.
#[derive(Debug)]
pub enum AssemblyEvent {
    Open { matched: bool, capacity: usize },
    Chunk(Bytes),
    End,
}

/// Side effect requested by a transition.
#[derive(Debug)]
pub enum AssemblyAction {
    None,
    /// The chunk exceeded the remaining capacity and was dropped whole.
    ChunkDropped,
    /// The request completed; publish the accumulated payload.
    Publish(Vec<u8>),
    /// Wrong method or path; answer 404 without publishing.
    Reject,
}

/// Pure transition function for request assembly.
pub fn step(state: AssemblyState, event: AssemblyEvent) -> (AssemblyState, AssemblyAction) {
    match (state, event) {
        (AssemblyState::Idle, AssemblyEvent::Open { matched, capacity }) => (
            AssemblyState::Accumulating {
                matched,
                buffer: BoundedBuffer::new(capacity),
            },
            AssemblyAction::None,
        ),
        (AssemblyState::Accumulating { matched, mut buffer }, AssemblyEvent::Chunk(chunk)) => {
            let action = if buffer.push_chunk(&chunk) {
                AssemblyAction::None
            } else {
                AssemblyAction::ChunkDropped
            };
            (AssemblyState::Accumulating { matched, buffer }, action)
        }
        (AssemblyState::Accumulating { matched: true, buffer }, AssemblyEvent::End) => (
            AssemblyState::Complete,
            AssemblyAction::Publish(buffer.into_bytes()),
        ),
        (AssemblyState::Accumulating { matched: false, .. }, AssemblyEvent::End) => {
            (AssemblyState::Rejected, AssemblyAction::Reject)
        }
        // Events out of order reject the request.
        _ => (AssemblyState::Rejected, AssemblyAction::Reject),
    }
}

/// Shared state of the listener's handler tasks.
#[derive(Clone)]
pub struct IngressState {
    pub sink: Arc<dyn CommandSink>,
    pub command_path: String,
    pub max_body_size: usize,
}

pub fn router(state: IngressState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(State(state): State<IngressState>, request: Request) -> Response {
    let matched =
        request.method() == Method::POST && request.uri().path() == state.command_path;

    let (mut assembly, _) = step(
        AssemblyState::Idle,
        AssemblyEvent::Open {
            matched,
            capacity: state.max_body_size,
        },
    );

    // The body is consumed even for requests that will be rejected; the
    // transfer is never aborted mid-stream.
    let mut body = request.into_body().into_data_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Body read failed: {}", e);
                return (StatusCode::NOT_FOUND, NOT_FOUND).into_response();
            }
        };
        let (next, action) = step(assembly, AssemblyEvent::Chunk(chunk));
        assembly = next;
        if matches!(action, AssemblyAction::ChunkDropped) {
            warn!("Body too large, dropping chunk");
        }
    }

    let (_, action) = step(assembly, AssemblyEvent::End);
    match action {
        AssemblyAction::Publish(payload) => {
            debug!("{} body: {} bytes", state.command_path, payload.len());
            match state.sink.publish_command(payload).await {
                Ok(()) => (StatusCode::OK, ACCEPTED).into_response(),
                Err(e) => {
                    error!("Failed to publish command: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, PUBLISH_FAILED).into_response()
                }
            }
        }
        _ => (StatusCode::NOT_FOUND, NOT_FOUND).into_response(),
    }
}

/// Running command listener.
pub struct IngressServer {
    addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Binds the listener and starts serving in a background task.
pub async fn start(listen_port: u16, state: IngressState) -> Result<IngressServer, IngressError> {
    let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
    let addr = listener.local_addr()?;

    let app = router(state);
    let token = CancellationToken::new();
    let shutdown = token.clone();
    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!("HTTP server exited with error: {}", e);
        }
    });

    info!("Listening on port {}", addr.port());
    Ok(IngressServer { addr, token, handle })
}

impl IngressServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Closes the listening socket; in-flight requests drain through the
    /// HTTP layer's own shutdown semantics.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Listener task join failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::BridgeError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn publish_command(&self, payload: Vec<u8>) -> Result<(), BridgeError> {
            self.published.lock().unwrap().push(payload);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl CommandSink for FailingSink {
        async fn publish_command(&self, _payload: Vec<u8>) -> Result<(), BridgeError> {
            Err(BridgeError::Publish("request queue closed".to_string()))
        }
    }

    fn test_router(sink: Arc<dyn CommandSink>) -> Router {
        router(IngressState {
            sink,
            command_path: "/command".to_string(),
            max_body_size: 1024,
        })
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn command_post_publishes_and_answers_200() {
        let sink = Arc::new(RecordingSink::default());
        let response = test_router(sink.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .body(Body::from(r#"{"cmd":"stop"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, ACCEPTED);

        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0], br#"{"cmd":"stop"}"#);
    }

    #[tokio::test]
    async fn empty_body_still_publishes() {
        let sink = Arc::new(RecordingSink::default());
        let response = test_router(sink.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].is_empty());
    }

    #[tokio::test]
    async fn publish_failure_answers_500() {
        let response = test_router(Arc::new(FailingSink))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, PUBLISH_FAILED);
    }

    #[tokio::test]
    async fn wrong_method_answers_404_without_publishing() {
        let sink = Arc::new(RecordingSink::default());
        let response = test_router(sink.clone())
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/command")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, NOT_FOUND);
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_path_answers_404_without_publishing() {
        let sink = Arc::new(RecordingSink::default());
        let response = test_router(sink.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/telemetry")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_chunk_is_dropped_and_prefix_published() {
        let sink = Arc::new(RecordingSink::default());
        let app = router(IngressState {
            sink: sink.clone(),
            command_path: "/command".to_string(),
            max_body_size: 8,
        });

        // 4 bytes fit, the second chunk would overflow and is dropped,
        // the last chunk fits again.
        let chunks: Vec<Result<Bytes, Infallible>> = vec![
            Ok(Bytes::from_static(b"1234")),
            Ok(Bytes::from_static(b"56789")),
            Ok(Bytes::from_static(b"56")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/command")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0], b"123456");
    }

    #[test]
    fn assembly_accumulates_and_publishes() {
        let (state, _) = step(
            AssemblyState::Idle,
            AssemblyEvent::Open {
                matched: true,
                capacity: 16,
            },
        );
        let (state, action) = step(state, AssemblyEvent::Chunk(Bytes::from_static(b"hello")));
        assert!(matches!(action, AssemblyAction::None));
        let (state, action) = step(state, AssemblyEvent::End);
        assert!(matches!(state, AssemblyState::Complete));
        match action {
            AssemblyAction::Publish(payload) => assert_eq!(payload, b"hello"),
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[test]
    fn assembly_rejects_unmatched_requests_at_end() {
        let (state, _) = step(
            AssemblyState::Idle,
            AssemblyEvent::Open {
                matched: false,
                capacity: 16,
            },
        );
        let (state, action) = step(state, AssemblyEvent::Chunk(Bytes::from_static(b"ignored")));
        assert!(matches!(action, AssemblyAction::None));
        let (state, action) = step(state, AssemblyEvent::End);
        assert!(matches!(state, AssemblyState::Rejected));
        assert!(matches!(action, AssemblyAction::Reject));
    }

    #[test]
    fn assembly_reports_dropped_chunks() {
        let (state, _) = step(
            AssemblyState::Idle,
            AssemblyEvent::Open {
                matched: true,
                capacity: 8,
            },
        );
        let (state, action) = step(state, AssemblyEvent::Chunk(Bytes::from_static(b"12345678")));
        assert!(matches!(action, AssemblyAction::ChunkDropped));
        let (_, action) = step(state, AssemblyEvent::End);
        match action {
            AssemblyAction::Publish(payload) => assert!(payload.is_empty()),
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[test]
    fn assembly_rejects_out_of_order_events() {
        let (state, action) = step(AssemblyState::Idle, AssemblyEvent::End);
        assert!(matches!(state, AssemblyState::Rejected));
        assert!(matches!(action, AssemblyAction::Reject));

        let (state, action) = step(
            AssemblyState::Complete,
            AssemblyEvent::Chunk(Bytes::from_static(b"late")),
        );
        assert!(matches!(state, AssemblyState::Rejected));
        assert!(matches!(action, AssemblyAction::Reject));
    }

    #[tokio::test]
    async fn server_starts_serves_and_stops() {
        let sink = Arc::new(RecordingSink::default());
        let server = start(
            0,
            IngressState {
                sink: sink.clone(),
                command_path: "/command".to_string(),
                max_body_size: 1024,
            },
        )
        .await
        .unwrap();

        let url = format!("http://127.0.0.1:{}/command", server.local_addr().port());
        let response = reqwest::Client::new()
            .post(&url)
            .body(r#"{"cmd":"stop"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), ACCEPTED);
        assert_eq!(sink.published.lock().unwrap().len(), 1);

        server.stop().await;
    }
}
