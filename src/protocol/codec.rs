//! Wire codecs for each protocol flavor.
//!
//! Control and prompt messages travel as JSON text frames with a `type`
//! discriminator. Audio travels as base64 inside JSON (transcription input)
//! or as raw little-endian 16-bit PCM binary frames (synthesis output).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::{
    ControlKind, ProtocolFlavor, StreamMessage, STT_SAMPLE_RATE, TTS_SAMPLE_RATE,
};
use super::ProtocolError;

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Message to deliver, if any. Silence produces none.
    pub message: Option<StreamMessage>,
    /// True when the frame ends the generation it belongs to.
    pub terminal: bool,
}

impl Decoded {
    fn partial(message: StreamMessage) -> Self {
        Self {
            message: Some(message),
            terminal: false,
        }
    }

    fn terminal(message: Option<StreamMessage>) -> Self {
        Self {
            message,
            terminal: true,
        }
    }
}

/// Flavor-specific encode/decode strategy.
pub trait Codec: Send + Sync {
    fn flavor(&self) -> ProtocolFlavor;

    /// Encode an outbound message into a frame.
    fn encode(&self, message: &StreamMessage) -> Result<Frame, ProtocolError>;

    /// Decode an inbound frame.
    fn decode(&self, frame: Frame) -> Result<Decoded, ProtocolError>;
}

/// Select the codec for a flavor.
pub fn codec_for(flavor: ProtocolFlavor) -> Arc<dyn Codec> {
    match flavor {
        ProtocolFlavor::Transcription => Arc::new(SttCodec),
        ProtocolFlavor::Synthesis => Arc::new(TtsCodec),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Audio {
        audio: String,
    },
    Prompt {
        text: String,
        #[serde(default = "default_speaker_id")]
        speaker_id: u32,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
    },
    StreamEnd,
    Stop,
}

fn default_speaker_id() -> u32 {
    22
}

fn default_max_tokens() -> u32 {
    250
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    fatal: bool,
}

fn encode_json<T: Serialize>(value: &T) -> Result<Frame, ProtocolError> {
    Ok(Frame::Text(serde_json::to_string(value)?))
}

fn encode_control(kind: &ControlKind) -> Result<Frame, ProtocolError> {
    match kind {
        ControlKind::SetVad(params) => {
            let mut object = Map::with_capacity(params.len() + 1);
            object.insert("type".into(), Value::String("set_vad".into()));
            for (k, v) in params {
                if k != "type" {
                    object.insert(k.clone(), v.clone());
                }
            }
            encode_json(&Value::Object(object))
        }
        ControlKind::StreamEnd => encode_json(&WireMessage::StreamEnd),
        ControlKind::Stop => encode_json(&WireMessage::Stop),
    }
}

/// Parse a JSON text frame into a message, if it is a JSON object.
///
/// Returns `Ok(None)` for text that is not a JSON object.
fn parse_object(text: &str) -> Result<Option<StreamMessage>, ProtocolError> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v @ Value::Object(_)) => v,
        _ => return Ok(None),
    };

    if value.get("error").is_some() {
        let err: WireError = serde_json::from_value(value)?;
        return Ok(Some(StreamMessage::error(err.error, err.fatal)));
    }

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingField("type".into()))?;

    if kind == "set_vad" {
        let mut params = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        params.remove("type");
        return Ok(Some(StreamMessage::control(ControlKind::SetVad(params))));
    }

    let message = match serde_json::from_value::<WireMessage>(value) {
        Ok(WireMessage::Audio { audio }) => {
            let bytes = STANDARD
                .decode(audio.as_bytes())
                .map_err(|e| ProtocolError::Audio(e.to_string()))?;
            StreamMessage::audio(bytes, STT_SAMPLE_RATE)
        }
        Ok(WireMessage::Prompt {
            text,
            speaker_id,
            max_tokens,
        }) => StreamMessage::prompt(text, speaker_id, max_tokens),
        Ok(WireMessage::StreamEnd) => StreamMessage::control(ControlKind::StreamEnd),
        Ok(WireMessage::Stop) => StreamMessage::control(ControlKind::Stop),
        Err(_) => return Err(ProtocolError::UnknownType(kind)),
    };
    Ok(Some(message))
}

/// Parse a request frame as seen by a worker.
pub fn parse_request(text: &str) -> Result<StreamMessage, ProtocolError> {
    parse_object(text)?.ok_or_else(|| ProtocolError::InvalidFrame("expected a JSON object".into()))
}

fn check_pcm16(bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Audio("empty PCM frame".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::Audio(format!(
            "PCM16 frame has odd length {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Transcription codec: base64 audio out, bare text in.
#[derive(Debug, Default, Clone, Copy)]
pub struct SttCodec;

impl Codec for SttCodec {
    fn flavor(&self) -> ProtocolFlavor {
        ProtocolFlavor::Transcription
    }

    fn encode(&self, message: &StreamMessage) -> Result<Frame, ProtocolError> {
        match message {
            StreamMessage::AudioChunk { bytes, sample_rate } => {
                if *sample_rate != STT_SAMPLE_RATE {
                    return Err(ProtocolError::Audio(format!(
                        "expected {} Hz input, got {} Hz",
                        STT_SAMPLE_RATE, sample_rate
                    )));
                }
                check_pcm16(bytes)?;
                encode_json(&WireMessage::Audio {
                    audio: STANDARD.encode(bytes),
                })
            }
            StreamMessage::ControlSignal { kind } => encode_control(kind),
            other => Err(ProtocolError::Unsupported {
                flavor: self.flavor(),
                kind: other.kind(),
            }),
        }
    }

    fn decode(&self, frame: Frame) -> Result<Decoded, ProtocolError> {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(_) => {
                return Err(ProtocolError::InvalidFrame(
                    "binary frame from transcription worker".into(),
                ))
            }
        };

        match parse_object(&text)? {
            Some(message @ StreamMessage::ErrorSignal { .. }) => Ok(Decoded::terminal(Some(message))),
            Some(message @ StreamMessage::ControlSignal { .. }) => {
                let terminal = matches!(
                    message,
                    StreamMessage::ControlSignal {
                        kind: ControlKind::Stop | ControlKind::StreamEnd
                    }
                );
                Ok(Decoded {
                    message: Some(message),
                    terminal,
                })
            }
            Some(other) => Err(ProtocolError::Unsupported {
                flavor: self.flavor(),
                kind: other.kind(),
            }),
            None => {
                let text = text.trim();
                if text.is_empty() {
                    Ok(Decoded::terminal(None))
                } else {
                    Ok(Decoded::terminal(Some(StreamMessage::Transcript {
                        text: text.to_string(),
                    })))
                }
            }
        }
    }
}

/// Synthesis codec: JSON prompts out, raw PCM in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtsCodec;

impl Codec for TtsCodec {
    fn flavor(&self) -> ProtocolFlavor {
        ProtocolFlavor::Synthesis
    }

    fn encode(&self, message: &StreamMessage) -> Result<Frame, ProtocolError> {
        match message {
            StreamMessage::PromptText {
                text,
                speaker_id,
                max_tokens,
            } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ProtocolError::MissingField("text".into()));
                }
                encode_json(&WireMessage::Prompt {
                    text: text.to_string(),
                    speaker_id: *speaker_id,
                    max_tokens: *max_tokens,
                })
            }
            StreamMessage::ControlSignal { kind } => encode_control(kind),
            other => Err(ProtocolError::Unsupported {
                flavor: self.flavor(),
                kind: other.kind(),
            }),
        }
    }

    fn decode(&self, frame: Frame) -> Result<Decoded, ProtocolError> {
        match frame {
            Frame::Binary(bytes) => {
                check_pcm16(&bytes)?;
                Ok(Decoded::partial(StreamMessage::audio(bytes, TTS_SAMPLE_RATE)))
            }
            Frame::Text(text) => match parse_object(&text)? {
                Some(message @ StreamMessage::ErrorSignal { .. }) => {
                    Ok(Decoded::terminal(Some(message)))
                }
                Some(message @ StreamMessage::ControlSignal { .. }) => {
                    Ok(Decoded::terminal(Some(message)))
                }
                Some(other) => Err(ProtocolError::Unsupported {
                    flavor: self.flavor(),
                    kind: other.kind(),
                }),
                None => Err(ProtocolError::InvalidFrame(
                    "non-JSON text from synthesis worker".into(),
                )),
            },
        }
    }
}
