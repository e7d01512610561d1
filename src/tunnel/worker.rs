//! Worker-side tunnel state.
//!
//! One instance per worker process. The address is published on first use
//! and never rewritten; `shutdown` ends the tunnel's lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::info;

use super::provisioner::worker_stream_url;
use super::TunnelError;
use crate::registry::{Address, EndpointRegistry, WorkerDescriptor};

pub struct WorkerTunnel {
    registry: Arc<EndpointRegistry>,
    descriptor: WorkerDescriptor,
    address: OnceLock<Address>,
    shut_down: AtomicBool,
}

impl WorkerTunnel {
    pub fn new(registry: Arc<EndpointRegistry>, descriptor: WorkerDescriptor) -> Self {
        Self {
            registry,
            descriptor,
            address: OnceLock::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Publish the streaming endpoint for `tunnel_url` on first call.
    ///
    /// Later calls return the address published by the first one.
    pub fn publish(&self, tunnel_url: &str) -> Result<Address, TunnelError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TunnelError::Released(self.descriptor.to_string()));
        }
        if let Some(address) = self.address.get() {
            return Ok(address.clone());
        }

        let address = self
            .registry
            .publish(&self.descriptor, &worker_stream_url(tunnel_url))?;
        Ok(self.address.get_or_init(|| address).clone())
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.get()
    }

    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!(worker = %self.descriptor, "worker tunnel shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
