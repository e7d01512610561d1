use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use super::state::{SessionState, StateCell};
use super::tasks::{read_loop, write_loop, Inbound, ReadContext};
use super::{SessionError, SessionOptions};
use crate::interrupt::{GenerationId, InterruptionController};
use crate::protocol::{codec_for, Codec, Frame, ProtocolFlavor, StreamMessage};
use crate::registry::Address;
use crate::telemetry::{
    record_connect_failure, record_generation_started, record_interrupt, record_stale_drop,
    SessionSpan, SpanExt,
};

/// Bidirectional streaming connection to one worker.
///
/// `send` may be called from any task holding a shared reference; `recv`,
/// `close` and `abort` need exclusive access.
pub struct StreamSession {
    id: Uuid,
    address: Address,
    flavor: ProtocolFlavor,
    codec: Arc<dyn Codec>,
    controller: Arc<InterruptionController>,
    state: Arc<StateCell>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    inbound: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    close_grace: Duration,
    span: Span,
}

impl StreamSession {
    /// Open a session to `address`, authenticating with the configured
    /// credential. Fails if the handshake does not finish in time.
    pub async fn connect(
        address: &Address,
        options: SessionOptions,
    ) -> Result<StreamSession, SessionError> {
        let id = Uuid::new_v4();
        let span = SessionSpan::new(&id.to_string(), options.flavor, address.as_str());
        let state = Arc::new(StateCell::new());
        state.transition(SessionState::Connecting);

        let result = open_socket(address, &options).instrument(span.clone()).await;
        span.record_result(&result);
        let socket = match result {
            Ok(socket) => socket,
            Err(e) => {
                state.transition(SessionState::Closed);
                record_connect_failure();
                return Err(e);
            }
        };

        let (sink, stream) = socket.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(options.inbound_buffer.max(1));
        let codec = codec_for(options.flavor);
        let controller = Arc::new(InterruptionController::with_attribution(
            options.attribution(),
        ));
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(
            write_loop(sink, out_rx, cancel.child_token()).instrument(span.clone()),
        );
        let reader = tokio::spawn(
            read_loop(
                stream,
                ReadContext {
                    codec: codec.clone(),
                    controller: controller.clone(),
                    state: state.clone(),
                    inbound: in_tx,
                    cancel: cancel.child_token(),
                },
            )
            .instrument(span.clone()),
        );

        state.transition(SessionState::Connected);
        span.in_scope(|| info!("session connected"));

        Ok(StreamSession {
            id,
            address: address.clone(),
            flavor: options.flavor,
            codec,
            controller,
            state,
            outbound: Mutex::new(Some(out_tx)),
            inbound: in_rx,
            cancel,
            writer: Some(writer),
            reader: Some(reader),
            close_grace: options.close_grace,
            span,
        })
    }

    /// Queue a message for the worker.
    ///
    /// Returns the generation the message belongs to when it expects a reply.
    /// A prompt always starts a new generation, superseding the active one;
    /// audio joins the active generation or starts one.
    pub fn send(&self, message: StreamMessage) -> Result<Option<GenerationId>, SessionError> {
        let state = self.state.get();
        if !state.accepts_sends() {
            return Err(match self.state.fatal() {
                Some(reason) => SessionError::RemoteFatal(reason),
                None => SessionError::NotConnected { state },
            });
        }

        let frame = self.codec.encode(&message)?;

        // Held across registration and enqueue so generation order matches
        // frame order across concurrent senders.
        let outbound = self.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            return Err(SessionError::NotConnected {
                state: self.state.get(),
            });
        };

        let generation = if message.starts_generation() {
            let supersede = matches!(message, StreamMessage::PromptText { .. });
            let (id, started) = self.controller.register_request(supersede);
            if started {
                record_generation_started(self.flavor);
                self.span
                    .in_scope(|| debug!(generation = %id, kind = message.kind(), "generation started"));
            }
            Some(id)
        } else {
            None
        };

        // Before enqueueing, so a fast terminal reply cannot be overtaken.
        if generation.is_some() {
            self.state.transition(SessionState::Streaming);
        }
        sender
            .send(frame)
            .map_err(|_| SessionError::Transport("writer task ended".to_string()))?;
        Ok(generation)
    }

    /// Next message of the active generation.
    ///
    /// Stale messages from superseded or interrupted generations are dropped.
    /// A fatal error is always delivered and ends the stream. Returns `None`
    /// once the session is closed.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        loop {
            let inbound = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                inbound = self.inbound.recv() => inbound?,
            };

            if inbound.message.is_fatal() {
                return Some(inbound.message);
            }

            match inbound.generation {
                Some(generation) if self.controller.is_active(generation) => {
                    return Some(inbound.message);
                }
                Some(generation) => {
                    record_stale_drop();
                    self.span.in_scope(|| {
                        debug!(generation = %generation, kind = inbound.message.kind(), "dropping stale message")
                    });
                }
                None => {
                    self.span.in_scope(|| {
                        debug!(kind = inbound.message.kind(), "dropping unsolicited message")
                    });
                }
            }
        }
    }

    /// Inbound messages as a stream. Ends when the session closes.
    pub fn messages(&mut self) -> impl Stream<Item = StreamMessage> + '_ {
        futures::stream::unfold(self, |session| async move {
            session.recv().await.map(|message| (message, session))
        })
    }

    /// Invalidate the active generation. Output still in flight for it is
    /// discarded on arrival.
    pub fn interrupt(&self) -> Option<GenerationId> {
        let interrupted = self.controller.interrupt();
        if let Some(generation) = interrupted {
            record_interrupt();
            self.state.transition(SessionState::Connected);
            self.span
                .in_scope(|| info!(generation = %generation, "generation interrupted"));
        }
        interrupted
    }

    /// Flush queued frames within the close grace period, then close.
    /// Idempotent.
    pub async fn close(&mut self) {
        self.shutdown(self.close_grace).await;
    }

    /// Close immediately, discarding queued frames. Idempotent.
    pub async fn abort(&mut self) {
        self.shutdown(Duration::ZERO).await;
    }

    async fn shutdown(&mut self, grace: Duration) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.transition(SessionState::Draining);
        self.outbound.lock().take();
        let deadline = tokio::time::Instant::now() + grace;

        if let Some(mut writer) = self.writer.take() {
            if grace.is_zero() {
                writer.abort();
            } else if tokio::time::timeout_at(deadline, &mut writer).await.is_err() {
                self.span
                    .in_scope(|| warn!(grace_ms = grace.as_millis() as u64, "writer did not flush in time"));
                writer.abort();
            }
        }

        // The worker may still be answering flushed frames; keep reading until
        // it echoes the close, drops the connection, or the grace period ends.
        if let Some(mut reader) = self.reader.take() {
            if grace.is_zero() {
                reader.abort();
            } else if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
                self.span
                    .in_scope(|| debug!(grace_ms = grace.as_millis() as u64, "worker did not close in time"));
                reader.abort();
            }
        }

        self.cancel.cancel();
        self.controller.reset();
        self.state.transition(SessionState::Closed);
        self.span.in_scope(|| info!("session closed"));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Fatal error reported by the worker or transport, if any.
    pub fn fatal_error(&self) -> Option<String> {
        self.state.fatal()
    }

    pub fn controller(&self) -> &InterruptionController {
        &self.controller
    }

    pub fn flavor(&self) -> ProtocolFlavor {
        self.flavor
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn open_socket(
    address: &Address,
    options: &SessionOptions,
) -> Result<super::tasks::WsStream, SessionError> {
    let connection_error = |message: String| SessionError::Connection {
        address: address.to_string(),
        message,
    };

    if !address.is_streaming() {
        return Err(connection_error(format!(
            "scheme '{}' is not a streaming endpoint",
            address.scheme()
        )));
    }

    let mut request = address
        .as_str()
        .into_client_request()
        .map_err(|e| connection_error(e.to_string()))?;
    if let Some(credential) = &options.credential {
        let value = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| connection_error(format!("invalid credential: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        debug!(credential = %credential.fingerprint(), "authenticating");
    }

    match tokio::time::timeout(options.handshake_timeout, connect_async(request)).await {
        Ok(Ok((socket, response))) => {
            debug!(status = %response.status(), "handshake complete");
            Ok(socket)
        }
        Ok(Err(e)) => Err(connection_error(e.to_string())),
        Err(_) => Err(connection_error(format!(
            "handshake timed out after {:?}",
            options.handshake_timeout
        ))),
    }
}
