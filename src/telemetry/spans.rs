//! Span utilities for session tracing.

use tracing::{info_span, Span};

use crate::protocol::ProtocolFlavor;

/// Extension trait for recording outcomes into a span.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized session spans.
pub struct SessionSpan;

impl SessionSpan {
    /// Span covering one session and its I/O tasks.
    ///
    /// `status` and `error.message` are filled by `SpanExt::record_result`.
    pub fn new(session_id: &str, flavor: ProtocolFlavor, address: &str) -> Span {
        info_span!(
            "stream_session",
            session_id = %session_id,
            flavor = %flavor,
            address = %address,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span covering one adapter start, from tunnel open to connected session.
    pub fn start(descriptor: &str) -> Span {
        info_span!(
            "pipeline_start",
            descriptor = %descriptor,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            attempts = tracing::field::Empty,
        )
    }
}
