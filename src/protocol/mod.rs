//! Streaming wire protocol shared by transcription and synthesis workers.

mod codec;
mod message;

pub use codec::{codec_for, parse_request, Codec, Decoded, Frame, SttCodec, TtsCodec};
pub use message::{ControlKind, ProtocolFlavor, StreamMessage, STT_SAMPLE_RATE, TTS_SAMPLE_RATE};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Message '{kind}' not supported by {flavor} flavor")]
    Unsupported {
        flavor: ProtocolFlavor,
        kind: &'static str,
    },

    #[error("Invalid audio payload: {0}")]
    Audio(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
