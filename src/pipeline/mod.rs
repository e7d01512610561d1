//! Binds a tunnel and a streaming session to pipeline lifecycle events.
//!
//! `start` provisions and resolves a tunnel, then connects with retry.
//! `stop` closes gracefully, `cancel` aborts; both release the tunnel after
//! the session. Cancellation is observed through a [`CancellationToken`]
//! so it also interrupts a `start` still waiting on resolution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::interrupt::GenerationId;
use crate::protocol::{ProtocolFlavor, StreamMessage};
use crate::registry::{Address, WorkerDescriptor};
use crate::session::{SessionError, SessionOptions, StreamSession};
use crate::telemetry::{SessionSpan, SpanExt};
use crate::tunnel::{TunnelError, TunnelHandle, TunnelManager};

/// Initial delay between connect attempts.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Maximum delay between connect attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Pipeline not started")]
    NotStarted,
}

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub resolve_timeout: Duration,
    pub connect_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub session: SessionOptions,
}

impl AdapterConfig {
    pub fn new(flavor: ProtocolFlavor) -> Self {
        Self {
            resolve_timeout: Duration::from_secs(60),
            connect_attempts: 3,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            session: SessionOptions::new(flavor),
        }
    }
}

/// One pipeline stage backed by a remote streaming worker.
pub struct PipelineAdapter {
    tunnels: Arc<TunnelManager>,
    descriptor: WorkerDescriptor,
    config: AdapterConfig,
    tunnel: Option<TunnelHandle>,
    session: Option<StreamSession>,
    cancel: CancellationToken,
}

impl PipelineAdapter {
    pub fn new(
        tunnels: Arc<TunnelManager>,
        descriptor: WorkerDescriptor,
        config: AdapterConfig,
    ) -> Self {
        Self {
            tunnels,
            descriptor,
            config,
            tunnel: None,
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this adapter from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Open and resolve the tunnel, then connect.
    ///
    /// Calling `start` on a connected adapter is a no-op. If the future is
    /// dropped, the tunnel opened so far is released by `stop` or `cancel`.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if self.session.is_some() {
            return Ok(());
        }
        let span = SessionSpan::start(&self.descriptor.to_string());
        let result = self.start_inner().instrument(span.clone()).await;
        span.record_result(&result);

        if let Err(e) = &result {
            warn!(worker = %self.descriptor, error = %e, "pipeline start failed");
            self.release_tunnel().await;
        }
        result
    }

    async fn start_inner(&mut self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if self.tunnel.is_none() {
            let handle = tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                handle = self.tunnels.open(&self.descriptor) => handle?,
            };
            self.tunnel = Some(handle);
        }
        let Some(handle) = self.tunnel.as_ref() else {
            return Err(PipelineError::NotStarted);
        };

        let address = tokio::select! {
            _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
            address = self.tunnels.resolve(handle, self.config.resolve_timeout) => address?,
        };

        let session = self.connect_with_retry(&address).await?;
        info!(worker = %self.descriptor, address = %address, session = %session.id(), "pipeline started");
        self.session = Some(session);
        Ok(())
    }

    async fn connect_with_retry(&self, address: &Address) -> Result<StreamSession, PipelineError> {
        let attempts = self.config.connect_attempts.max(1);
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=attempts {
            tracing::Span::current().record("attempts", attempt);
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = StreamSession::connect(address, self.config.session.clone()) => result,
            };

            match result {
                Ok(session) => return Ok(session),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, retry_in = ?backoff, "connect attempt failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PipelineError::NotStarted)
    }

    /// Forward a message to the worker.
    pub fn send(&self, message: StreamMessage) -> Result<Option<GenerationId>, PipelineError> {
        let session = self.session.as_ref().ok_or(PipelineError::NotStarted)?;
        Ok(session.send(message)?)
    }

    /// The user barged in. The connection stays open.
    pub fn user_interrupt(&self) -> Option<GenerationId> {
        self.session.as_ref().and_then(StreamSession::interrupt)
    }

    /// Next output of the active generation.
    ///
    /// Returns `None` when not started or once the session has ended; an
    /// ended session is torn down together with its tunnel.
    pub async fn next_output(&mut self) -> Option<StreamMessage> {
        let session = self.session.as_mut()?;
        let next = tokio::select! {
            _ = self.cancel.cancelled() => None,
            next = session.recv() => next,
        };
        if next.is_none() {
            debug!(worker = %self.descriptor, "session ended");
            self.stop().await;
        }
        next
    }

    /// Graceful shutdown: close the session, then release the tunnel.
    pub async fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.release_tunnel().await;
    }

    /// Immediate shutdown. Buffered output is discarded. Safe to call while
    /// a `start` is pending on another task holding the cancel token.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(mut session) = self.session.take() {
            session.abort().await;
        }
        self.release_tunnel().await;
    }

    async fn release_tunnel(&mut self) {
        if let Some(handle) = self.tunnel.take() {
            self.tunnels.close(&handle).await;
        }
    }
}

/// Lifecycle and data events fed to [`run_control_loop`].
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Start,
    Send(StreamMessage),
    UserInterrupt,
    Stop,
    Cancel,
}

/// Drive `adapter` from `events`, forwarding session output to `outputs`.
///
/// Start failures are reported on `outputs` as fatal `ErrorSignal`s. The
/// loop ends after `Stop` or `Cancel`, when `events` closes, or when
/// `outputs` is dropped.
pub async fn run_control_loop(
    mut adapter: PipelineAdapter,
    mut events: mpsc::Receiver<PipelineEvent>,
    outputs: mpsc::Sender<StreamMessage>,
) {
    let mut pending: VecDeque<PipelineEvent> = VecDeque::new();

    loop {
        let event = if let Some(event) = pending.pop_front() {
            Some(event)
        } else {
            let connected = adapter.is_connected();
            tokio::select! {
                event = events.recv() => event,
                output = adapter.next_output(), if connected => {
                    if let Some(message) = output {
                        if outputs.send(message).await.is_err() {
                            debug!("output receiver dropped");
                            adapter.cancel().await;
                            return;
                        }
                    }
                    continue;
                }
            }
        };

        match event {
            Some(PipelineEvent::Start) => {
                let result = {
                    let start = adapter.start();
                    tokio::pin!(start);
                    loop {
                        tokio::select! {
                            result = &mut start => break result,
                            event = events.recv() => match event {
                                Some(PipelineEvent::Cancel) | None => break Err(PipelineError::Cancelled),
                                Some(other) => pending.push_back(other),
                            },
                        }
                    }
                };
                match result {
                    Ok(()) => {}
                    Err(PipelineError::Cancelled) => {
                        adapter.cancel().await;
                        return;
                    }
                    Err(e) => {
                        error!(error = %e, "pipeline start failed");
                        if outputs.send(StreamMessage::error(e.to_string(), true)).await.is_err() {
                            adapter.cancel().await;
                            return;
                        }
                    }
                }
            }
            Some(PipelineEvent::Send(message)) => {
                if let Err(e) = adapter.send(message) {
                    warn!(error = %e, "dropping outbound message");
                }
            }
            Some(PipelineEvent::UserInterrupt) => {
                adapter.user_interrupt();
            }
            Some(PipelineEvent::Stop) => {
                adapter.stop().await;
                return;
            }
            Some(PipelineEvent::Cancel) | None => {
                adapter.cancel().await;
                return;
            }
        }
    }
}
