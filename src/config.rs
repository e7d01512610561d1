//! Runtime configuration loading from environment variables.
//!
//! All values come from `VOICE_RELAY_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `VOICE_RELAY_AUTH_TOKEN` | (none) | Bearer token for workers |
//! | `VOICE_RELAY_RESOLVE_TIMEOUT` | 60 | Wait for worker address (secs) |
//! | `VOICE_RELAY_POLL_INTERVAL_MS` | 1000 | Registry poll interval (ms) |
//! | `VOICE_RELAY_HANDSHAKE_TIMEOUT` | 10 | WebSocket handshake timeout (secs) |
//! | `VOICE_RELAY_CLOSE_GRACE_MS` | 500 | Outbound flush grace on close (ms) |
//! | `VOICE_RELAY_CONNECT_ATTEMPTS` | 3 | Connect attempts per start |
//! | `VOICE_RELAY_SPEAKER_ID` | 22 | Default synthesis speaker |
//! | `VOICE_RELAY_MAX_TOKENS` | 250 | Default synthesis token budget |
//! | `VOICE_RELAY_TTS_END_MARKERS` | false | Synthesis worker sends `stream_end` |
//! | `VOICE_RELAY_HEALTH_RETRIES` | 60 | Readiness probe attempts |
//! | `VOICE_RELAY_LOG` | info | Log filter directives |
//! | `VOICE_RELAY_LOG_FORMAT` | json | `json` or `pretty` |
//! | `VOICE_RELAY_LOG_FILE` | (none) | Append logs to this file |

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::Credential;
use crate::health::HealthConfig;
use crate::pipeline::AdapterConfig;
use crate::protocol::ProtocolFlavor;
use crate::session::SessionOptions;
use crate::telemetry::{LogConfig, LogFormat};
use crate::tunnel::TunnelConfig;

/// Effective runtime configuration summary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EffectiveConfig {
    pub auth_token_fingerprint: Option<String>,
    pub resolve_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub handshake_timeout_secs: u64,
    pub close_grace_ms: u64,
    pub connect_attempts: u32,
    pub speaker_id: u32,
    pub max_tokens: u32,
    pub tts_end_markers: bool,
    pub health_retries: u32,
    pub log_filter: String,
    pub log_file: Option<String>,
}

/// Synthesis defaults applied to prompts built from plain text.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisDefaults {
    pub speaker_id: u32,
    pub max_tokens: u32,
    /// The worker terminates each utterance with `stream_end`.
    pub end_markers: bool,
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            speaker_id: 22,
            max_tokens: 250,
            end_markers: false,
        }
    }
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub credential: Option<Credential>,
    pub resolve_timeout: Duration,
    pub tunnel: TunnelConfig,
    pub handshake_timeout: Duration,
    pub close_grace: Duration,
    pub connect_attempts: u32,
    pub synthesis: SynthesisDefaults,
    pub health: HealthConfig,
    pub log: LogConfig,
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`1`/`true`/`yes`, `0`/`false`/`no`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_tunnel_config() -> TunnelConfig {
    let poll_ms = parse_u64("VOICE_RELAY_POLL_INTERVAL_MS", 1000);
    let poll_ms = poll_ms.clamp(10, 60_000);
    TunnelConfig {
        poll_interval: Duration::from_millis(poll_ms),
    }
}

fn load_synthesis_defaults() -> SynthesisDefaults {
    let speaker_id = parse_u32("VOICE_RELAY_SPEAKER_ID", 22);
    let max_tokens = parse_u32("VOICE_RELAY_MAX_TOKENS", 250);
    let max_tokens = max_tokens.max(1);
    SynthesisDefaults {
        speaker_id,
        max_tokens,
        end_markers: parse_bool("VOICE_RELAY_TTS_END_MARKERS", false),
    }
}

fn load_health_config() -> HealthConfig {
    let max_attempts = parse_u32("VOICE_RELAY_HEALTH_RETRIES", 60);
    HealthConfig {
        max_attempts: max_attempts.max(1),
        ..HealthConfig::default()
    }
}

fn load_log_config() -> LogConfig {
    let level = std::env::var("VOICE_RELAY_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let format = std::env::var("VOICE_RELAY_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let output_path = std::env::var("VOICE_RELAY_LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    LogConfig {
        format,
        level,
        output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let auth_token = std::env::var("VOICE_RELAY_AUTH_TOKEN").unwrap_or_default();
    let resolve_secs = parse_u64("VOICE_RELAY_RESOLVE_TIMEOUT", 60).max(1);
    let handshake_secs = parse_u64("VOICE_RELAY_HANDSHAKE_TIMEOUT", 10).max(1);
    let close_grace_ms = parse_u64("VOICE_RELAY_CLOSE_GRACE_MS", 500);
    let connect_attempts = parse_u32("VOICE_RELAY_CONNECT_ATTEMPTS", 3).clamp(1, 20);

    EnvConfig {
        credential: Credential::from_config(&auth_token),
        resolve_timeout: Duration::from_secs(resolve_secs),
        tunnel: load_tunnel_config(),
        handshake_timeout: Duration::from_secs(handshake_secs),
        close_grace: Duration::from_millis(close_grace_ms),
        connect_attempts,
        synthesis: load_synthesis_defaults(),
        health: load_health_config(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Session options for `flavor` carrying the configured credential and
    /// timeouts.
    pub fn session_options(&self, flavor: ProtocolFlavor) -> SessionOptions {
        let mut options = SessionOptions {
            handshake_timeout: self.handshake_timeout,
            close_grace: self.close_grace,
            ..SessionOptions::new(flavor).with_credential(self.credential.clone())
        };
        if flavor == ProtocolFlavor::Synthesis {
            options = options.with_end_markers(self.synthesis.end_markers);
        }
        options
    }

    /// Adapter configuration for `flavor`.
    pub fn adapter_config(&self, flavor: ProtocolFlavor) -> AdapterConfig {
        AdapterConfig {
            resolve_timeout: self.resolve_timeout,
            connect_attempts: self.connect_attempts,
            session: self.session_options(flavor),
            ..AdapterConfig::new(flavor)
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            auth_token_fingerprint: self.credential.as_ref().map(Credential::fingerprint),
            resolve_timeout_secs: self.resolve_timeout.as_secs(),
            poll_interval_ms: self.tunnel.poll_interval.as_millis() as u64,
            handshake_timeout_secs: self.handshake_timeout.as_secs(),
            close_grace_ms: self.close_grace.as_millis() as u64,
            connect_attempts: self.connect_attempts,
            speaker_id: self.synthesis.speaker_id,
            max_tokens: self.synthesis.max_tokens,
            tts_end_markers: self.synthesis.end_markers,
            health_retries: self.health.max_attempts,
            log_filter: self.log.level.clone(),
            log_file: self
                .log
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}
