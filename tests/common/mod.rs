//! Local WebSocket worker used by integration tests.
//!
//! Each inbound request is parsed with the worker-side parser and answered by
//! a script. Replies for one request are sent before the next request is
//! read, as the real workers do.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use voice_relay::protocol::parse_request;
use voice_relay::registry::EndpointRegistry;
use voice_relay::tunnel::{ProvisionContext, Provisioner, TunnelError};
use voice_relay::{StreamMessage, WorkerDescriptor};

pub const TOKEN: &str = "test-token";

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Binary(Vec<u8>),
    Pause(Duration),
    Close,
}

pub type Script = Arc<dyn Fn(&StreamMessage) -> Vec<Reply> + Send + Sync>;

pub struct MockWorker {
    pub url: String,
    pub received: Arc<Mutex<Vec<StreamMessage>>>,
    pub connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockWorker {
    pub fn received(&self) -> Vec<StreamMessage> {
        self.received.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until the worker has seen `count` requests.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<StreamMessage> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let received = self.received();
            if received.len() >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a worker on an ephemeral port requiring `TOKEN`.
pub async fn spawn_worker(script: Script) -> MockWorker {
    spawn_worker_with_token(Some(TOKEN), script).await
}

pub async fn spawn_worker_with_token(token: Option<&str>, script: Script) -> MockWorker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let expected = token.map(|t| format!("Bearer {}", t));

    let handle = {
        let received = received.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let expected = expected.clone();
                let received = received.clone();
                let connections = connections.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    let check = move |request: &Request, response: Response| {
                        let header = request
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        match &expected {
                            Some(expected) if header.as_deref() != Some(expected.as_str()) => {
                                let mut error = ErrorResponse::new(Some("unauthorized".into()));
                                *error.status_mut() = StatusCode::UNAUTHORIZED;
                                Err(error)
                            }
                            _ => Ok(response),
                        }
                    };
                    let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, check).await
                    else {
                        return;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    serve(socket, received, script).await;
                });
            }
        })
    };

    MockWorker {
        url: format!("ws://127.0.0.1:{}/ws", port),
        received,
        connections,
        handle,
    }
}

async fn serve(
    socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    received: Arc<Mutex<Vec<StreamMessage>>>,
    script: Script,
) {
    let (mut sink, mut stream) = socket.split();
    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };
        let Ok(request) = parse_request(&text) else {
            continue;
        };
        received.lock().push(request.clone());

        for reply in script(&request) {
            let sent = match reply {
                Reply::Text(text) => sink.send(Message::Text(text)).await,
                Reply::Binary(bytes) => sink.send(Message::Binary(bytes)).await,
                Reply::Pause(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
                Reply::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            };
            if sent.is_err() {
                return;
            }
        }
    }
}

/// Synthesis worker: each prompt yields `chunks` PCM frames filled with the
/// prompt's first byte, then `stream_end`.
pub fn tts_script(chunks: usize, pause: Duration) -> Script {
    Arc::new(move |request: &StreamMessage| match request {
        StreamMessage::PromptText { text, .. } => {
            let marker = text.as_bytes().first().copied().unwrap_or(0);
            let mut replies = Vec::new();
            for _ in 0..chunks {
                replies.push(Reply::Binary(vec![marker; 8]));
                if !pause.is_zero() {
                    replies.push(Reply::Pause(pause));
                }
            }
            replies.push(Reply::Text(r#"{"type":"stream_end"}"#.to_string()));
            replies
        }
        _ => Vec::new(),
    })
}

/// Synthesis worker that streams raw PCM only: each prompt yields `chunks`
/// frames filled with the prompt's first byte and no end marker.
pub fn pcm_script(chunks: usize, pause: Duration) -> Script {
    Arc::new(move |request: &StreamMessage| match request {
        StreamMessage::PromptText { text, .. } => {
            let marker = text.as_bytes().first().copied().unwrap_or(0);
            let mut replies = Vec::new();
            for _ in 0..chunks {
                if !pause.is_zero() {
                    replies.push(Reply::Pause(pause));
                }
                replies.push(Reply::Binary(vec![marker; 8]));
            }
            replies
        }
        _ => Vec::new(),
    })
}

/// Transcription worker: all-zero audio is silence, anything else is
/// transcribed as `transcript`.
pub fn stt_script(transcript: &'static str) -> Script {
    Arc::new(move |request: &StreamMessage| match request {
        StreamMessage::AudioChunk { bytes, .. } if bytes.iter().all(|b| *b == 0) => {
            vec![Reply::Text(String::new())]
        }
        StreamMessage::AudioChunk { .. } => vec![Reply::Text(transcript.to_string())],
        _ => Vec::new(),
    })
}

/// Receive until the next message, failing the test after `timeout`.
pub async fn recv_within(
    session: &mut voice_relay::StreamSession,
    timeout: Duration,
) -> Option<StreamMessage> {
    tokio::time::timeout(timeout, session.recv())
        .await
        .expect("timed out waiting for a message")
}

/// Provisioner that never publishes and counts its calls.
#[derive(Default)]
pub struct CountingProvisioner {
    pub provisioned: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_provision: bool,
}

impl CountingProvisioner {
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for CountingProvisioner {
    async fn provision(
        &self,
        descriptor: &WorkerDescriptor,
        _registry: &Arc<EndpointRegistry>,
    ) -> Result<ProvisionContext, TunnelError> {
        if self.fail_provision {
            return Err(TunnelError::Provision {
                descriptor: descriptor.to_string(),
                message: "no capacity".into(),
            });
        }
        self.provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(ProvisionContext::new(None))
    }

    async fn release(&self, _context: &ProvisionContext) -> Result<(), TunnelError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
