//! Outbound and inbound I/O tasks of a session.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{SessionState, StateCell};
use crate::interrupt::{GenerationId, InterruptionController};
use crate::protocol::{Codec, Frame, StreamMessage};
use crate::telemetry::record_decode_failure;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound message tagged with the generation it was attributed to.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub generation: Option<GenerationId>,
    pub message: StreamMessage,
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    }
}

/// Drain queued frames to the socket in enqueue order.
///
/// Exits when the queue's sender is dropped (after flushing and sending a
/// close frame) or immediately on cancellation.
pub(crate) async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("writer cancelled");
                return;
            }
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(to_message(frame)).await {
                        warn!(error = %e, "outbound send failed");
                        return;
                    }
                }
                None => break,
            },
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(error = %e, "close frame not delivered");
    }
}

pub(crate) struct ReadContext {
    pub codec: Arc<dyn Codec>,
    pub controller: Arc<InterruptionController>,
    pub state: Arc<StateCell>,
    pub inbound: mpsc::Sender<Inbound>,
    pub cancel: CancellationToken,
}

/// Decode inbound frames, attribute them to generations and queue them.
pub(crate) async fn read_loop(mut stream: SplitStream<WsStream>, ctx: ReadContext) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            next = stream.next() => next,
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => Frame::Text(text),
            Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes),
            Some(Ok(Message::Close(close))) => {
                info!(?close, "worker closed the connection");
                break "worker closed the connection".to_string();
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("connection to worker lost: {}", e),
            None => break "connection to worker ended".to_string(),
        };

        let decoded = match ctx.codec.decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                record_decode_failure();
                warn!(error = %e, "skipping malformed frame");
                continue;
            }
        };

        let generation = ctx.controller.attribute();
        if decoded.terminal {
            if let Some((id, more)) = ctx.controller.retire() {
                if !more && ctx.controller.is_active(id) {
                    ctx.state.transition(SessionState::Connected);
                }
            }
        }

        let Some(message) = decoded.message else {
            continue;
        };

        if let StreamMessage::ErrorSignal {
            message: reason,
            fatal: true,
        } = &message
        {
            error!(error = %reason, "worker reported a fatal error");
            ctx.state.fail(reason.clone());
            ctx.controller.reset();
            if ctx.inbound.send(Inbound { generation, message }).await.is_err() {
                debug!("inbound receiver dropped");
            }
            return;
        }

        if ctx.inbound.send(Inbound { generation, message }).await.is_err() {
            debug!("inbound receiver dropped");
            return;
        }
    };

    if ctx.cancel.is_cancelled()
        || matches!(ctx.state.get(), SessionState::Draining | SessionState::Closed)
    {
        debug!(reason = %reason, "transport ended during shutdown");
        return;
    }

    warn!(reason = %reason, "session transport ended");
    ctx.state.fail(reason.clone());
    ctx.controller.reset();
    if ctx
        .inbound
        .send(Inbound {
            generation: None,
            message: StreamMessage::error(reason, true),
        })
        .await
        .is_err()
    {
        debug!("inbound receiver dropped");
    }
}
