//! Counters recorded through the `metrics` facade.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::protocol::ProtocolFlavor;

pub fn record_generation_started(flavor: ProtocolFlavor) {
    counter!("voice_relay_generations_total", "flavor" => flavor.to_string()).increment(1);
}

/// A message from a superseded or interrupted generation was discarded.
pub fn record_stale_drop() {
    counter!("voice_relay_stale_messages_dropped_total").increment(1);
}

pub fn record_decode_failure() {
    counter!("voice_relay_decode_failures_total").increment(1);
}

pub fn record_interrupt() {
    counter!("voice_relay_interrupts_total").increment(1);
}

pub fn record_connect_failure() {
    counter!("voice_relay_connect_failures_total").increment(1);
}

pub fn record_tunnel_resolved(waited: Duration) {
    counter!("voice_relay_tunnels_resolved_total").increment(1);
    histogram!("voice_relay_tunnel_resolve_seconds").record(waited.as_secs_f64());
}

pub fn record_tunnel_released() {
    counter!("voice_relay_tunnels_released_total").increment(1);
}
