//! Fuzz target for inbound frame decoding.
//!
//! Arbitrary worker frames must decode to a message or an error, never a
//! panic, for both flavors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use voice_relay::protocol::{codec_for, parse_request, Frame, ProtocolFlavor};

fuzz_target!(|data: &[u8]| {
    for flavor in [ProtocolFlavor::Transcription, ProtocolFlavor::Synthesis] {
        let codec = codec_for(flavor);
        let _ = codec.decode(Frame::Binary(data.to_vec()));
        if let Ok(text) = std::str::from_utf8(data) {
            let _ = codec.decode(Frame::Text(text.to_string()));
        }
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_request(text);
    }
});
