//! Messages exchanged with streaming workers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample rate of PCM sent to transcription workers.
pub const STT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of PCM produced by synthesis workers.
pub const TTS_SAMPLE_RATE: u32 = 24_000;

/// Control signal kinds carried in text frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    /// Voice-activity-detection parameters, passed through untouched.
    SetVad(serde_json::Map<String, serde_json::Value>),
    /// End of one utterance from a synthesis worker.
    StreamEnd,
    /// Explicit stop of the current generation.
    Stop,
}

impl ControlKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetVad(_) => "set_vad",
            Self::StreamEnd => "stream_end",
            Self::Stop => "stop",
        }
    }
}

/// Payload sent to or received from a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    AudioChunk { bytes: Vec<u8>, sample_rate: u32 },
    PromptText {
        text: String,
        speaker_id: u32,
        max_tokens: u32,
    },
    Transcript { text: String },
    ControlSignal { kind: ControlKind },
    ErrorSignal { message: String, fatal: bool },
}

impl StreamMessage {
    pub fn audio(bytes: Vec<u8>, sample_rate: u32) -> Self {
        Self::AudioChunk { bytes, sample_rate }
    }

    pub fn prompt(text: impl Into<String>, speaker_id: u32, max_tokens: u32) -> Self {
        Self::PromptText {
            text: text.into(),
            speaker_id,
            max_tokens,
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::ErrorSignal {
            message: message.into(),
            fatal,
        }
    }

    pub fn control(kind: ControlKind) -> Self {
        Self::ControlSignal { kind }
    }

    /// Outbound messages that open a new generation.
    pub fn starts_generation(&self) -> bool {
        matches!(self, Self::AudioChunk { .. } | Self::PromptText { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ErrorSignal { fatal: true, .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AudioChunk { .. } => "audio",
            Self::PromptText { .. } => "prompt",
            Self::Transcript { .. } => "transcript",
            Self::ControlSignal { kind } => kind.name(),
            Self::ErrorSignal { .. } => "error",
        }
    }
}

/// Protocol flavor selected at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFlavor {
    /// Speech-to-text: base64 audio out, text in.
    Transcription,
    /// Text-to-speech: prompts out, raw PCM in.
    Synthesis,
}

impl fmt::Display for ProtocolFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transcription => f.write_str("transcription"),
            Self::Synthesis => f.write_str("synthesis"),
        }
    }
}
