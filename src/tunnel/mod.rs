//! Tunnel lifecycle management.
//!
//! Owns provisioning requests, waits for the worker to publish its address,
//! and releases the tunnel exactly once when the session ends.

mod handle;
mod provisioner;
mod worker;

pub use handle::{TunnelHandle, TunnelState};
pub use provisioner::{worker_stream_url, ProvisionContext, Provisioner, StaticProvisioner};
pub use worker::WorkerTunnel;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::{Address, EndpointRegistry, RegistryError, WorkerDescriptor};
use crate::telemetry::{record_tunnel_released, record_tunnel_resolved};

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Address for {descriptor} not published within {waited:?}")]
    ResolutionTimeout { descriptor: String, waited: Duration },

    #[error("Provisioning failed for {descriptor}: {message}")]
    Provision { descriptor: String, message: String },

    #[error("Tunnel for {0} already released")]
    Released(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Configuration for tunnel resolution.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Interval between registry checks while waiting for a worker.
    pub poll_interval: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Provisions, resolves and releases tunnels for one process.
pub struct TunnelManager {
    registry: Arc<EndpointRegistry>,
    provisioner: Arc<dyn Provisioner>,
    config: TunnelConfig,
    next_id: AtomicU64,
    open: AtomicUsize,
}

impl TunnelManager {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        provisioner: Arc<dyn Provisioner>,
        config: TunnelConfig,
    ) -> Self {
        Self {
            registry,
            provisioner,
            config,
            next_id: AtomicU64::new(1),
            open: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Request a worker and tunnel. Does not wait for the worker to start.
    pub async fn open(&self, descriptor: &WorkerDescriptor) -> Result<TunnelHandle, TunnelError> {
        let context = self.provisioner.provision(descriptor, &self.registry).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);

        info!(
            tunnel = id,
            worker = %descriptor,
            reservation = %context.reservation_id,
            "tunnel requested"
        );
        Ok(TunnelHandle::new(id, descriptor.clone(), context))
    }

    /// Wait until the worker behind `handle` publishes its address.
    ///
    /// Checks the registry every `poll_interval`, waking early on publish.
    /// Fails with [`TunnelError::ResolutionTimeout`] once `timeout` elapses.
    /// Dropping the returned future leaves `handle` valid for [`close`].
    ///
    /// [`close`]: TunnelManager::close
    pub async fn resolve(
        &self,
        handle: &TunnelHandle,
        timeout: Duration,
    ) -> Result<Address, TunnelError> {
        if handle.is_released() {
            return Err(TunnelError::Released(handle.descriptor().to_string()));
        }
        if let Some(address) = handle.address() {
            return Ok(address.clone());
        }

        let started = Instant::now();
        let deadline = started + timeout;
        let mut checks: u32 = 0;

        loop {
            let notified = self.registry.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            checks += 1;
            if let Some(address) = self.registry.lookup(handle.descriptor()) {
                let address = handle.set_address(address);
                info!(
                    tunnel = handle.id(),
                    worker = %handle.descriptor(),
                    address = %address,
                    checks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tunnel resolved"
                );
                record_tunnel_resolved(started.elapsed());
                return Ok(address);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    tunnel = handle.id(),
                    worker = %handle.descriptor(),
                    checks,
                    "worker never published an address"
                );
                return Err(TunnelError::ResolutionTimeout {
                    descriptor: handle.descriptor().to_string(),
                    waited: timeout,
                });
            }

            let wait = self.config.poll_interval.min(deadline - now);
            debug!(tunnel = handle.id(), checks, "address not published yet");
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Release the tunnel. Idempotent; failures are logged, never returned.
    pub async fn close(&self, handle: &TunnelHandle) {
        if !handle.mark_released() {
            debug!(tunnel = handle.id(), "tunnel already released");
            return;
        }

        if let Err(e) = self.provisioner.release(handle.context()).await {
            warn!(tunnel = handle.id(), worker = %handle.descriptor(), error = %e, "tunnel release failed");
        }
        self.open.fetch_sub(1, Ordering::SeqCst);
        record_tunnel_released();
        info!(tunnel = handle.id(), worker = %handle.descriptor(), "tunnel released");
    }

    /// Number of tunnels opened and not yet released.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}
