use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::HostIdentity;

#[cfg(test)]
pub mod fake;
pub mod rancher;
pub use rancher::RancherMetadata;

/// A metadata value could not be read this cycle.
///
/// Covers connection failures, non-success responses and malformed bodies.
/// Callers treat it as "unknown, try again next cycle".
#[derive(Debug, Error)]
#[error("metadata unavailable at {path}: {reason}")]
pub struct Unavailable {
    pub path: String,
    pub reason: String,
}

impl Unavailable {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Per-container values needed to materialize a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAttributes {
    pub uuid: String,
    pub managed_ip: String,
    /// `None` when the container does not carry the floating-IP label.
    pub floating_ip: Option<String>,
}

#[async_trait]
pub trait MetadataReader {
    /// Identity of the host the agent is running on.
    async fn host_identity(&self) -> Result<HostIdentity, Unavailable>;

    /// Names of every container known to the metadata service.
    async fn list_container_names(&self) -> Result<BTreeSet<String>, Unavailable>;

    /// UUID of the host the named container is scheduled on.
    async fn host_owner_of(&self, name: &str) -> Result<String, Unavailable>;

    async fn attributes_of(&self, name: &str) -> Result<ContainerAttributes, Unavailable>;
}
