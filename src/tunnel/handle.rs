//! Tunnel handle owned by the lifecycle manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tracing::warn;

use super::provisioner::ProvisionContext;
use crate::registry::{Address, WorkerDescriptor};

/// Lifecycle of a provisioned tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Requested,
    Resolved,
    Released,
}

/// A provisioned network path to one worker.
///
/// Not `Clone`: exactly one owner, released exactly once.
#[derive(Debug)]
pub struct TunnelHandle {
    id: u64,
    descriptor: WorkerDescriptor,
    context: ProvisionContext,
    address: OnceLock<Address>,
    released: AtomicBool,
}

impl TunnelHandle {
    pub(crate) fn new(id: u64, descriptor: WorkerDescriptor, context: ProvisionContext) -> Self {
        Self {
            id,
            descriptor,
            context,
            address: OnceLock::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.context
    }

    /// Resolved address, once known.
    pub fn address(&self) -> Option<&Address> {
        self.address.get()
    }

    pub fn state(&self) -> TunnelState {
        if self.is_released() {
            TunnelState::Released
        } else if self.address.get().is_some() {
            TunnelState::Resolved
        } else {
            TunnelState::Requested
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn set_address(&self, address: Address) -> Address {
        self.address.get_or_init(|| address).clone()
    }

    /// Mark released. Returns true only for the first caller.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(
                tunnel = self.id,
                worker = %self.descriptor,
                "tunnel handle dropped without close"
            );
        }
    }
}
