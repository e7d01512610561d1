//! Endpoint registry for worker address discovery.
//!
//! A worker publishes its reachable address once under its descriptor and a
//! client reads it back. Entries are write-once for the lifetime of the
//! process: republishing the same value is a no-op, a different value is
//! rejected. Absence of an entry means "not ready yet", never an error.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Registry key under which a worker publishes its address.
pub const URL_KEY: &str = "url";

const SUPPORTED_SCHEMES: &[&str] = &["ws", "wss", "http", "https"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Entry {key} for {descriptor} already published as {existing}")]
    AlreadyPublished {
        descriptor: String,
        key: String,
        existing: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Identifies a remote worker by application and class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub app_name: String,
    pub class_name: String,
}

impl WorkerDescriptor {
    pub fn new(app_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            class_name: class_name.into(),
        }
    }
}

impl fmt::Display for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.class_name)
    }
}

/// A validated worker address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse an address, accepting `ws`, `wss`, `http` and `https` URLs.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| RegistryError::InvalidAddress(raw.to_string()))?;

        if !SUPPORTED_SCHEMES.contains(&scheme) {
            return Err(RegistryError::InvalidAddress(format!(
                "unsupported scheme '{}' in {}",
                scheme, raw
            )));
        }
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(RegistryError::InvalidAddress(format!("missing host in {}", raw)));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map(|(s, _)| s).unwrap_or_default()
    }

    /// True for `ws://` and `wss://` addresses.
    pub fn is_streaming(&self) -> bool {
        matches!(self.scheme(), "ws" | "wss")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared write-once key-value store used for address discovery.
pub struct EndpointRegistry {
    entries: DashMap<(WorkerDescriptor, String), String>,
    published: Notify,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            published: Notify::new(),
        }
    }

    /// Write `value` under `key` for `descriptor`, at most once.
    pub fn put(
        &self,
        descriptor: &WorkerDescriptor,
        key: &str,
        value: &str,
    ) -> Result<(), RegistryError> {
        match self.entries.entry((descriptor.clone(), key.to_string())) {
            Entry::Occupied(existing) => {
                if existing.get() == value {
                    debug!(worker = %descriptor, key, "registry entry republished unchanged");
                    return Ok(());
                }
                Err(RegistryError::AlreadyPublished {
                    descriptor: descriptor.to_string(),
                    key: key.to_string(),
                    existing: existing.get().clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                self.published.notify_waiters();
                Ok(())
            }
        }
    }

    /// Read the value under `key` for `descriptor`, if published.
    pub fn get(&self, descriptor: &WorkerDescriptor, key: &str) -> Option<String> {
        self.entries
            .get(&(descriptor.clone(), key.to_string()))
            .map(|v| v.value().clone())
    }

    /// Publish the worker's reachable address under [`URL_KEY`].
    pub fn publish(&self, descriptor: &WorkerDescriptor, url: &str) -> Result<Address, RegistryError> {
        let address = Address::parse(url)?;
        self.put(descriptor, URL_KEY, address.as_str())?;
        info!(worker = %descriptor, address = %address, "worker address published");
        Ok(address)
    }

    /// Look up the published address. `None` means the worker is not ready yet.
    pub fn lookup(&self, descriptor: &WorkerDescriptor) -> Option<Address> {
        self.get(descriptor, URL_KEY)
            .and_then(|raw| Address::parse(&raw).ok())
    }

    /// Future that completes on the next publish of any entry.
    pub fn notified(&self) -> Notified<'_> {
        self.published.notified()
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
