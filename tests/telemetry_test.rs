//! Telemetry module tests.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Span;
use voice_relay::telemetry::{
    record_connect_failure, record_decode_failure, record_generation_started, record_interrupt,
    record_stale_drop, record_tunnel_released, record_tunnel_resolved, LogConfig, LogError,
    LogFormat, SessionSpan, SpanExt,
};
use voice_relay::ProtocolFlavor;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "voice_relay::session=debug".to_string(),
        output_path: Some(PathBuf::from("/tmp/voice-relay.log")),
    };
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/voice-relay.log")));
}

#[test]
fn log_format_parses_aliases() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!(matches!(
        "xml".parse::<LogFormat>(),
        Err(LogError::UnknownFormat(f)) if f == "xml"
    ));
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(LogError::AlreadyInitialized
        .to_string()
        .contains("already initialized"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_record_result() {
    let span = Span::none();
    span.record_result(&Ok::<_, &str>(1));
    span.record_result(&Err::<i32, _>("handshake failed"));
}

#[test]
fn session_spans_create_without_panic() {
    let session = SessionSpan::new("6f1c", ProtocolFlavor::Synthesis, "wss://tts.example/ws");
    let start = SessionSpan::start("swahili-csm-tts/SwahiliTTS");
    let _guard = start.enter();
    let _inner = session.enter();
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn recorders_without_exporter_are_noops() {
    record_generation_started(ProtocolFlavor::Transcription);
    record_generation_started(ProtocolFlavor::Synthesis);
    record_stale_drop();
    record_decode_failure();
    record_interrupt();
    record_connect_failure();
    record_tunnel_resolved(Duration::from_millis(2500));
    record_tunnel_resolved(Duration::ZERO);
    record_tunnel_released();
}
