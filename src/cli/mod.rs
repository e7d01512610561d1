// Copyright 2024-2026 Voice Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for exercising workers by hand.
//!
//! ## Usage
//!
//! ```bash
//! voice-relay say --url wss://tts.example/ws --text "Habari"
//! voice-relay transcribe --url wss://stt.example/ws --input clip.pcm
//! voice-relay probe https://llm.example
//! voice-relay config show
//! ```

pub mod config_cmd;
pub mod probe_cmd;
pub mod stream_cmd;

use std::sync::Arc;

use crate::config::EnvConfig;
use crate::pipeline::{PipelineAdapter, PipelineError};
use crate::protocol::ProtocolFlavor;
use crate::registry::{EndpointRegistry, WorkerDescriptor};
use crate::session::SessionError;
use crate::tunnel::{StaticProvisioner, TunnelError, TunnelManager};

/// Exit codes shared by all subcommands.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONNECTION: i32 = 3;

/// Default synthesis worker.
pub fn synthesis_worker() -> WorkerDescriptor {
    WorkerDescriptor::new("swahili-csm-tts", "SwahiliTTS")
}

/// Default transcription worker.
pub fn transcription_worker() -> WorkerDescriptor {
    WorkerDescriptor::new("swahili-omnilingual-transcription", "SwahiliTranscriber")
}

/// Value following `flag` at `args[*i]`, advancing past both.
pub(crate) fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            Ok(value.clone())
        }
        None => Err(format!("Missing value for {}", flag)),
    }
}

/// Adapter for a worker whose address is already known.
pub(crate) fn static_adapter(
    config: &EnvConfig,
    descriptor: WorkerDescriptor,
    url: &str,
    flavor: ProtocolFlavor,
) -> PipelineAdapter {
    let registry = Arc::new(EndpointRegistry::new());
    let provisioner = Arc::new(StaticProvisioner::new().with_worker(descriptor.clone(), url));
    let tunnels = Arc::new(TunnelManager::new(
        registry,
        provisioner,
        config.tunnel.clone(),
    ));
    PipelineAdapter::new(tunnels, descriptor, config.adapter_config(flavor))
}

/// Exit code for a failed start.
pub(crate) fn exit_code_for(error: &PipelineError) -> i32 {
    match error {
        PipelineError::Tunnel(TunnelError::ResolutionTimeout { .. })
        | PipelineError::Session(SessionError::Connection { .. }) => EXIT_CONNECTION,
        PipelineError::Tunnel(TunnelError::Registry(_)) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}
