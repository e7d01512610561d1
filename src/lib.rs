//! Voice Relay
//!
//! Tunnel-backed streaming sessions for remote speech workers. A pipeline
//! stage provisions a worker behind a tunnel, waits for the worker to publish
//! its address, and exchanges audio and text with it over a WebSocket while
//! discarding output the user has interrupted.
//!
//! # Components
//!
//! - [`registry`]: write-once address registry shared with workers
//! - [`tunnel`]: provisioning, address resolution and release
//! - [`session`]: streaming client with per-flavor framing from [`protocol`]
//! - [`interrupt`]: generation tracking and stale-output filtering
//! - [`pipeline`]: binds the above to start/stop/cancel/interrupt events
//! - [`llm`], [`health`]: request/response workers over HTTP

pub mod auth;
pub mod cli;
pub mod config;
pub mod health;
pub mod interrupt;
pub mod llm;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod tunnel;

pub use auth::Credential;
pub use interrupt::{Attribution, GenerationId, InterruptionController};
pub use pipeline::{
    run_control_loop, AdapterConfig, PipelineAdapter, PipelineError, PipelineEvent,
};
pub use protocol::{ControlKind, ProtocolFlavor, StreamMessage};
pub use registry::{Address, EndpointRegistry, WorkerDescriptor};
pub use session::{SessionError, SessionOptions, SessionState, StreamSession};
pub use tunnel::{TunnelError, TunnelHandle, TunnelManager};
