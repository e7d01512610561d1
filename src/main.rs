//! voice-relay entry point.
//!
//! ## CLI Subcommands
//!
//! - `voice-relay say` - Synthesize text through a streaming TTS worker
//! - `voice-relay transcribe` - Transcribe raw PCM through a streaming STT worker
//! - `voice-relay probe` - Wait for an HTTP worker to report ready
//! - `voice-relay config show` - Print effective configuration

use std::process::ExitCode;

use voice_relay::cli::{config_cmd, probe_cmd, stream_cmd, EXIT_FAILURE, EXIT_USAGE};
use voice_relay::config;
use voice_relay::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    let config = config::load();
    if let Err(e) = init_logging(&config.log) {
        eprintln!("Logging disabled: {}", e);
    }

    let code = match command {
        "say" => interruptible(stream_cmd::run_say(&args, &config)).await,
        "transcribe" => interruptible(stream_cmd::run_transcribe(&args, &config)).await,
        "probe" => interruptible(probe_cmd::run_probe(&args, &config)).await,
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => config_cmd::run_show(args.get(3).map(|s| s.as_str()) == Some("--json")),
                "defaults" => {
                    config_cmd::run_defaults();
                    0
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    EXIT_USAGE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("voice-relay {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            EXIT_USAGE
        }
    };
    ExitCode::from(code as u8)
}

/// Run a command until it finishes or Ctrl+C arrives.
async fn interruptible(command: impl std::future::Future<Output = i32>) -> i32 {
    tokio::select! {
        code = command => code,
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                eprintln!("Signal handler failed: {}", e);
                return EXIT_FAILURE;
            }
            eprintln!("Interrupted");
            130
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "voice-relay v{}

USAGE:
    voice-relay <COMMAND> [OPTIONS]

COMMANDS:
    say          Synthesize text through a streaming TTS worker
    transcribe   Transcribe raw 16 kHz PCM through a streaming STT worker
    probe        Wait until an HTTP worker reports ready
    config       Show configuration (show, defaults)
    version      Show version information
    help         Show this help message

EXAMPLES:
    voice-relay say --url wss://tts.example/ws --text \"Habari\" --out habari.pcm
    voice-relay transcribe --url wss://stt.example/ws --input clip.pcm
    voice-relay probe https://llm.example --retries 30
    voice-relay config show --json

ENVIRONMENT:
    VOICE_RELAY_AUTH_TOKEN   Bearer token sent to workers
    VOICE_RELAY_LOG          Log filter (default: info)
    VOICE_RELAY_LOG_FORMAT   json or pretty (default: json)
    See 'voice-relay config defaults' for the full list.

EXIT CODES:
    0  Success
    1  Failure
    2  Usage or configuration error
    3  Connection error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "say" => {
            eprintln!(
                "voice-relay say - Synthesize speech

USAGE:
    voice-relay say --url <WS_URL> --text <TEXT> [OPTIONS]

OPTIONS:
    --out FILE        Write raw PCM (s16le, 24 kHz mono) to FILE
    --speaker N       Speaker id (default: VOICE_RELAY_SPEAKER_ID)
    --max-tokens N    Generation budget (default: VOICE_RELAY_MAX_TOKENS)
"
            );
        }
        "transcribe" => {
            eprintln!(
                "voice-relay transcribe - Transcribe audio

USAGE:
    voice-relay transcribe --url <WS_URL> --input <PCM_FILE> [OPTIONS]

OPTIONS:
    --chunk-ms MS     Audio per message (default: 1000)
    --idle-ms MS      Stop after no output for MS (default: 3000)

The input must be raw s16le mono PCM at 16 kHz.
"
            );
        }
        "probe" => {
            eprintln!(
                "voice-relay probe - Wait for worker readiness

USAGE:
    voice-relay probe <URL> [--retries N] [--interval-ms MS] [--json]

Polls GET <URL>/health until it answers 200.

EXIT CODES:
    0  Worker ready
    3  Worker never became ready
"
            );
        }
        "config" => {
            eprintln!(
                "voice-relay config - Show configuration

USAGE:
    voice-relay config <SUBCOMMAND>

SUBCOMMANDS:
    show [--json]  Show effective configuration
    defaults       Show default configuration
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'voice-relay help' for general usage.",
                command
            );
        }
    }
}
