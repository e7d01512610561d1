//! Streaming sessions with remote workers.
//!
//! A session owns one WebSocket connection, an outbound writer task and an
//! inbound reader task. Outbound order is preserved per session; inbound
//! messages pass through the interruption filter before delivery.

mod client;
mod state;
mod tasks;

pub use client::StreamSession;
pub use state::SessionState;

use std::time::Duration;

use thiserror::Error;

use crate::auth::Credential;
use crate::interrupt::Attribution;
use crate::protocol::{ProtocolError, ProtocolFlavor};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection to {address} failed: {message}")]
    Connection { address: String, message: String },

    #[error("Session not accepting sends in state {state:?}")]
    NotConnected { state: SessionState },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker reported a fatal error: {0}")]
    RemoteFatal(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Options fixed at session construction.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub flavor: ProtocolFlavor,
    /// Bearer token sent during the handshake.
    pub credential: Option<Credential>,
    pub handshake_timeout: Duration,
    /// How long `close` waits for queued frames to flush.
    pub close_grace: Duration,
    /// Capacity of the inbound message queue.
    pub inbound_buffer: usize,
    /// Whether the worker ends every reply with a terminal frame.
    /// Transcription workers answer each chunk; synthesis workers stream
    /// audio without an end marker unless configured otherwise.
    pub end_markers: bool,
}

impl SessionOptions {
    pub fn new(flavor: ProtocolFlavor) -> Self {
        Self {
            flavor,
            credential: None,
            handshake_timeout: Duration::from_secs(10),
            close_grace: Duration::from_millis(500),
            inbound_buffer: 256,
            end_markers: flavor == ProtocolFlavor::Transcription,
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_end_markers(mut self, end_markers: bool) -> Self {
        self.end_markers = end_markers;
        self
    }

    pub(crate) fn attribution(&self) -> Attribution {
        if self.end_markers {
            Attribution::Ordered
        } else {
            Attribution::Latest
        }
    }
}
