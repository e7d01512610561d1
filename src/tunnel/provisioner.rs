//! Tunnel provisioning backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::TunnelError;
use crate::registry::{EndpointRegistry, RegistryError, WorkerDescriptor};

/// Opaque provisioning context returned by a [`Provisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionContext {
    pub reservation_id: Uuid,
    pub detail: Option<String>,
}

impl ProvisionContext {
    pub fn new(detail: Option<String>) -> Self {
        Self {
            reservation_id: Uuid::new_v4(),
            detail,
        }
    }
}

/// Requests remote worker instances and the tunnels exposing them.
///
/// `provision` must not wait for the worker's own startup: publishing the
/// reachable address into the registry is the worker's job.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        descriptor: &WorkerDescriptor,
        registry: &Arc<EndpointRegistry>,
    ) -> Result<ProvisionContext, TunnelError>;

    async fn release(&self, context: &ProvisionContext) -> Result<(), TunnelError>;
}

/// Provisioner for workers whose address is already known.
///
/// Publishes the configured address on behalf of the worker, which makes it
/// suitable for local workers and diagnostics.
#[derive(Debug, Default, Clone)]
pub struct StaticProvisioner {
    addresses: HashMap<WorkerDescriptor, String>,
}

impl StaticProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, descriptor: WorkerDescriptor, url: impl Into<String>) -> Self {
        self.addresses.insert(descriptor, url.into());
        self
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(
        &self,
        descriptor: &WorkerDescriptor,
        registry: &Arc<EndpointRegistry>,
    ) -> Result<ProvisionContext, TunnelError> {
        let url = self
            .addresses
            .get(descriptor)
            .ok_or_else(|| TunnelError::Provision {
                descriptor: descriptor.to_string(),
                message: "no static address configured".into(),
            })?;

        match registry.publish(descriptor, url) {
            Ok(_) | Err(RegistryError::AlreadyPublished { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(ProvisionContext::new(Some(url.clone())))
    }

    async fn release(&self, context: &ProvisionContext) -> Result<(), TunnelError> {
        debug!(reservation = %context.reservation_id, "static reservation released");
        Ok(())
    }
}

/// Convert a provisioned tunnel URL into the worker's streaming endpoint.
///
/// `https://host` becomes `wss://host/ws`, `http://host` becomes `ws://host/ws`.
pub fn worker_stream_url(tunnel_url: &str) -> String {
    let trimmed = tunnel_url.trim().trim_end_matches('/');
    let converted = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        trimmed.to_string()
    };
    format!("{}/ws", converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_stream_url_https() {
        assert_eq!(
            worker_stream_url("https://abc.tunnel.example"),
            "wss://abc.tunnel.example/ws"
        );
    }

    #[test]
    fn test_worker_stream_url_http_trailing_slash() {
        assert_eq!(worker_stream_url("http://127.0.0.1:8000/"), "ws://127.0.0.1:8000/ws");
    }

    #[tokio::test]
    async fn test_static_provisioner_publishes() {
        let registry = Arc::new(EndpointRegistry::new());
        let descriptor = WorkerDescriptor::new("swahili-csm-tts", "SwahiliTTS");
        let provisioner =
            StaticProvisioner::new().with_worker(descriptor.clone(), "wss://tunnel.example/ws");

        let ctx = provisioner.provision(&descriptor, &registry).await.unwrap();
        assert_eq!(ctx.detail.as_deref(), Some("wss://tunnel.example/ws"));
        assert!(registry.lookup(&descriptor).is_some());

        // Warm reuse does not fail on the write-once entry.
        provisioner.provision(&descriptor, &registry).await.unwrap();
    }

    #[tokio::test]
    async fn test_static_provisioner_unknown_worker() {
        let registry = Arc::new(EndpointRegistry::new());
        let provisioner = StaticProvisioner::new();
        let err = provisioner
            .provision(&WorkerDescriptor::new("a", "b"), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Provision { .. }));
    }
}
