// Copyright 2024-2026 Voice Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! `say` and `transcribe`: one-shot streaming sessions against a worker URL.

use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::{
    exit_code_for, static_adapter, synthesis_worker, take_value, transcription_worker,
    EXIT_FAILURE, EXIT_OK, EXIT_USAGE,
};
use crate::config::EnvConfig;
use crate::protocol::{
    ControlKind, ProtocolFlavor, StreamMessage, STT_SAMPLE_RATE, TTS_SAMPLE_RATE,
};

/// Synthesize `--text` and write raw PCM (s16le, 24 kHz) to `--out`.
///
/// Ends on `stream_end`, or once no audio has arrived for `--idle-ms` when
/// the worker does not mark the end of an utterance.
pub async fn run_say(args: &[String], config: &EnvConfig) -> i32 {
    let mut url = String::new();
    let mut text = String::new();
    let mut out = None;
    let mut speaker_id = config.synthesis.speaker_id;
    let mut max_tokens = config.synthesis.max_tokens;
    let mut idle_ms: u64 = 3000;

    let mut i = 2;
    while i < args.len() {
        let parsed = match args[i].as_str() {
            "--url" => take_value(args, &mut i, "--url").map(|v| url = v),
            "--text" => take_value(args, &mut i, "--text").map(|v| text = v),
            "--out" => take_value(args, &mut i, "--out").map(|v| out = Some(v)),
            "--speaker" => take_value(args, &mut i, "--speaker")
                .map(|v| speaker_id = v.parse().unwrap_or(speaker_id)),
            "--max-tokens" => take_value(args, &mut i, "--max-tokens")
                .map(|v| max_tokens = v.parse().unwrap_or(max_tokens)),
            "--idle-ms" => take_value(args, &mut i, "--idle-ms")
                .map(|v| idle_ms = v.parse().unwrap_or(idle_ms)),
            other => Err(format!("Unknown argument: {}", other)),
        };
        if let Err(message) = parsed {
            eprintln!("{}", message);
            return EXIT_USAGE;
        }
    }

    if url.is_empty() || text.trim().is_empty() {
        eprintln!(
            "Usage: voice-relay say --url <WS_URL> --text <TEXT> [--out FILE] [--speaker N] [--max-tokens N] [--idle-ms MS]"
        );
        return EXIT_USAGE;
    }

    let mut file = match &out {
        Some(path) => match tokio::fs::File::create(path).await {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to create {}: {}", path, e);
                return EXIT_FAILURE;
            }
        },
        None => None,
    };

    let mut adapter = static_adapter(config, synthesis_worker(), &url, ProtocolFlavor::Synthesis);
    if let Err(e) = adapter.start().await {
        eprintln!("Failed to start: {}", e);
        return exit_code_for(&e);
    }
    if let Err(e) = adapter.send(StreamMessage::prompt(text, speaker_id, max_tokens)) {
        eprintln!("Failed to send prompt: {}", e);
        adapter.stop().await;
        return EXIT_FAILURE;
    }

    let mut chunks = 0usize;
    let mut bytes = 0usize;
    let mut code = EXIT_OK;
    let idle = Duration::from_millis(idle_ms);
    while let Ok(Some(message)) = tokio::time::timeout(idle, adapter.next_output()).await {
        match message {
            StreamMessage::AudioChunk { bytes: pcm, .. } => {
                chunks += 1;
                bytes += pcm.len();
                if let Some(file) = file.as_mut() {
                    if let Err(e) = file.write_all(&pcm).await {
                        eprintln!("Write failed: {}", e);
                        code = EXIT_FAILURE;
                        break;
                    }
                }
            }
            StreamMessage::ControlSignal {
                kind: ControlKind::StreamEnd | ControlKind::Stop,
            } => break,
            StreamMessage::ErrorSignal { message, fatal } => {
                eprintln!("Worker error: {}", message);
                code = EXIT_FAILURE;
                if fatal {
                    break;
                }
            }
            other => tracing::debug!(kind = other.kind(), "ignoring message"),
        }
    }
    adapter.stop().await;

    if let Some(mut file) = file {
        if let Err(e) = file.flush().await {
            eprintln!("Write failed: {}", e);
            code = EXIT_FAILURE;
        }
    }

    let seconds = bytes as f64 / 2.0 / TTS_SAMPLE_RATE as f64;
    println!("{} chunk(s), {} bytes, {:.2}s of audio", chunks, bytes, seconds);
    code
}

/// Stream raw PCM (s16le, 16 kHz) from `--input` and print transcripts.
pub async fn run_transcribe(args: &[String], config: &EnvConfig) -> i32 {
    let mut url = String::new();
    let mut input = String::new();
    let mut chunk_ms: u64 = 1000;
    let mut idle_ms: u64 = 3000;

    let mut i = 2;
    while i < args.len() {
        let parsed = match args[i].as_str() {
            "--url" => take_value(args, &mut i, "--url").map(|v| url = v),
            "--input" => take_value(args, &mut i, "--input").map(|v| input = v),
            "--chunk-ms" => take_value(args, &mut i, "--chunk-ms")
                .map(|v| chunk_ms = v.parse().unwrap_or(chunk_ms).max(20)),
            "--idle-ms" => take_value(args, &mut i, "--idle-ms")
                .map(|v| idle_ms = v.parse().unwrap_or(idle_ms)),
            other => Err(format!("Unknown argument: {}", other)),
        };
        if let Err(message) = parsed {
            eprintln!("{}", message);
            return EXIT_USAGE;
        }
    }

    if url.is_empty() || input.is_empty() {
        eprintln!(
            "Usage: voice-relay transcribe --url <WS_URL> --input <PCM_FILE> [--chunk-ms MS] [--idle-ms MS]"
        );
        return EXIT_USAGE;
    }

    let pcm = match tokio::fs::read(&input).await {
        Ok(pcm) => pcm,
        Err(e) => {
            eprintln!("Failed to read {}: {}", input, e);
            return EXIT_FAILURE;
        }
    };

    let mut adapter = static_adapter(
        config,
        transcription_worker(),
        &url,
        ProtocolFlavor::Transcription,
    );
    if let Err(e) = adapter.start().await {
        eprintln!("Failed to start: {}", e);
        return exit_code_for(&e);
    }

    let chunk_bytes = pcm_chunk_bytes(chunk_ms);
    for chunk in pcm.chunks(chunk_bytes) {
        let chunk = &chunk[..chunk.len() & !1];
        if chunk.is_empty() {
            continue;
        }
        if let Err(e) = adapter.send(StreamMessage::audio(chunk.to_vec(), STT_SAMPLE_RATE)) {
            eprintln!("Failed to send audio: {}", e);
            adapter.stop().await;
            return EXIT_FAILURE;
        }
    }

    let mut code = EXIT_OK;
    let idle = Duration::from_millis(idle_ms);
    while let Ok(Some(message)) = tokio::time::timeout(idle, adapter.next_output()).await {
        match message {
            StreamMessage::Transcript { text } => println!("{}", text),
            StreamMessage::ErrorSignal { message, fatal } => {
                eprintln!("Worker error: {}", message);
                code = EXIT_FAILURE;
                if fatal {
                    break;
                }
            }
            other => tracing::debug!(kind = other.kind(), "ignoring message"),
        }
    }
    adapter.stop().await;
    code
}

/// Bytes of 16 kHz s16le audio in `chunk_ms` milliseconds.
fn pcm_chunk_bytes(chunk_ms: u64) -> usize {
    let samples = STT_SAMPLE_RATE as u64 * chunk_ms / 1000;
    (samples.max(1) * 2) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size() {
        assert_eq!(pcm_chunk_bytes(1000), 32_000);
        assert_eq!(pcm_chunk_bytes(20), 640);
        assert_eq!(pcm_chunk_bytes(0), 2);
    }
}
