//! Telemetry for voice relay sessions.
//!
//! Structured logging through `tracing`, per-session spans, and counters
//! through the `metrics` facade. No exporter is installed here; the embedding
//! application chooses one.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_connect_failure, record_decode_failure, record_generation_started,
    record_interrupt, record_stale_drop, record_tunnel_released, record_tunnel_resolved,
};
pub use spans::{SessionSpan, SpanExt};
