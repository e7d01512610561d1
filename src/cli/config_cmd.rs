// Copyright 2024-2026 Voice Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults.
//!
//! Read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs, or JSON with `json`.
pub fn run_show(json: bool) -> i32 {
    let cfg = config::load().effective_config();
    if json {
        return match serde_json::to_string_pretty(&cfg) {
            Ok(rendered) => {
                println!("{}", rendered);
                super::EXIT_OK
            }
            Err(e) => {
                eprintln!("Failed to render config: {}", e);
                super::EXIT_FAILURE
            }
        };
    }
    print_config(&cfg);
    super::EXIT_OK
}

/// Print the documented defaults.
pub fn run_defaults() {
    println!("VOICE_RELAY_RESOLVE_TIMEOUT=60");
    println!("VOICE_RELAY_POLL_INTERVAL_MS=1000");
    println!("VOICE_RELAY_HANDSHAKE_TIMEOUT=10");
    println!("VOICE_RELAY_CLOSE_GRACE_MS=500");
    println!("VOICE_RELAY_CONNECT_ATTEMPTS=3");
    println!("VOICE_RELAY_SPEAKER_ID=22");
    println!("VOICE_RELAY_MAX_TOKENS=250");
    println!("VOICE_RELAY_TTS_END_MARKERS=false");
    println!("VOICE_RELAY_HEALTH_RETRIES=60");
    println!("VOICE_RELAY_LOG=info");
    println!("VOICE_RELAY_LOG_FORMAT=json");
}

fn print_config(cfg: &EffectiveConfig) {
    match &cfg.auth_token_fingerprint {
        Some(fingerprint) => println!("VOICE_RELAY_AUTH_TOKEN=<sha256:{}>", fingerprint),
        None => println!("VOICE_RELAY_AUTH_TOKEN=<unset>"),
    }
    println!("VOICE_RELAY_RESOLVE_TIMEOUT={}", cfg.resolve_timeout_secs);
    println!("VOICE_RELAY_POLL_INTERVAL_MS={}", cfg.poll_interval_ms);
    println!("VOICE_RELAY_HANDSHAKE_TIMEOUT={}", cfg.handshake_timeout_secs);
    println!("VOICE_RELAY_CLOSE_GRACE_MS={}", cfg.close_grace_ms);
    println!("VOICE_RELAY_CONNECT_ATTEMPTS={}", cfg.connect_attempts);
    println!("VOICE_RELAY_SPEAKER_ID={}", cfg.speaker_id);
    println!("VOICE_RELAY_MAX_TOKENS={}", cfg.max_tokens);
    println!("VOICE_RELAY_TTS_END_MARKERS={}", cfg.tts_end_markers);
    println!("VOICE_RELAY_HEALTH_RETRIES={}", cfg.health_retries);
    println!("VOICE_RELAY_LOG={}", cfg.log_filter);
    if let Some(path) = &cfg.log_file {
        println!("VOICE_RELAY_LOG_FILE={}", path);
    }
}
