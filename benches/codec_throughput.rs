//! Wire codec throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use voice_relay::protocol::{codec_for, Frame, ProtocolFlavor, StreamMessage, STT_SAMPLE_RATE};

/// Audio chunk sizes in milliseconds at 16 kHz mono PCM16.
const CHUNK_MS: [usize; 3] = [20, 100, 500];

fn pcm_bytes(ms: usize) -> Vec<u8> {
    let samples = STT_SAMPLE_RATE as usize * ms / 1000;
    (0..samples * 2).map(|i| (i % 251) as u8).collect()
}

fn bench_encode_audio(c: &mut Criterion) {
    let codec = codec_for(ProtocolFlavor::Transcription);
    let mut group = c.benchmark_group("encode_audio");

    for ms in CHUNK_MS {
        let message = StreamMessage::audio(pcm_bytes(ms), STT_SAMPLE_RATE);
        group.throughput(Throughput::Bytes((ms * 32) as u64));
        group.bench_with_input(BenchmarkId::new("ms", ms), &message, |b, msg| {
            b.iter(|| codec.encode(black_box(msg)))
        });
    }

    group.finish();
}

fn bench_decode_synthesis(c: &mut Criterion) {
    let codec = codec_for(ProtocolFlavor::Synthesis);
    let mut group = c.benchmark_group("decode_synthesis");

    for ms in CHUNK_MS {
        let frame = Frame::Binary(pcm_bytes(ms));
        group.throughput(Throughput::Bytes((ms * 32) as u64));
        group.bench_with_input(BenchmarkId::new("ms", ms), &frame, |b, frame| {
            b.iter(|| codec.decode(black_box(frame.clone())))
        });
    }

    group.finish();
}

fn bench_decode_transcript(c: &mut Criterion) {
    let codec = codec_for(ProtocolFlavor::Transcription);
    let mut group = c.benchmark_group("decode_transcript");

    for (name, text) in [
        ("plain", "habari ya asubuhi".to_string()),
        ("control", r#"{"type":"stream_end"}"#.to_string()),
        ("error", r#"{"error":"model overloaded","fatal":false}"#.to_string()),
    ] {
        let frame = Frame::Text(text);
        group.bench_with_input(BenchmarkId::new("frame", name), &frame, |b, frame| {
            b.iter(|| codec.decode(black_box(frame.clone())))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_audio,
    bench_decode_synthesis,
    bench_decode_transcript
);
criterion_main!(benches);
