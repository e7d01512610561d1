// Copyright 2024-2026 Voice Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! `probe`: wait for an HTTP worker's readiness endpoint.

use std::time::Duration;

use super::{take_value, EXIT_CONNECTION, EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::config::EnvConfig;
use crate::health::{self, HealthError};

pub async fn run_probe(args: &[String], config: &EnvConfig) -> i32 {
    let mut url = None;
    let mut probe = config.health.clone();
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        let parsed = match args[i].as_str() {
            "--retries" => take_value(args, &mut i, "--retries").map(|v| {
                probe.max_attempts = v.parse().unwrap_or(probe.max_attempts).max(1);
            }),
            "--interval-ms" => take_value(args, &mut i, "--interval-ms").map(|v| {
                if let Ok(ms) = v.parse::<u64>() {
                    probe.interval = Duration::from_millis(ms);
                }
            }),
            "--json" => {
                json = true;
                i += 1;
                Ok(())
            }
            other if url.is_none() && !other.starts_with("--") => {
                url = Some(other.to_string());
                i += 1;
                Ok(())
            }
            other => Err(format!("Unknown argument: {}", other)),
        };
        if let Err(message) = parsed {
            eprintln!("{}", message);
            return EXIT_USAGE;
        }
    }

    let Some(url) = url else {
        eprintln!("Usage: voice-relay probe <URL> [--retries N] [--interval-ms MS] [--json]");
        return EXIT_USAGE;
    };

    match health::wait_until_ready(&url, &probe).await {
        Ok(report) => {
            if json {
                match serde_json::to_string(&report) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => eprintln!("Failed to render report: {}", e),
                }
            } else {
                println!("ready after {} attempt(s), {} ms", report.attempts, report.waited_ms);
            }
            EXIT_OK
        }
        Err(HealthError::InvalidUrl(url)) => {
            eprintln!("Invalid URL: {}", url);
            EXIT_USAGE
        }
        Err(e @ HealthError::NotReady { .. }) => {
            eprintln!("{}", e);
            EXIT_CONNECTION
        }
        Err(e) => {
            eprintln!("{}", e);
            EXIT_FAILURE
        }
    }
}
