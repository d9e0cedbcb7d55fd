//! In-memory metadata service for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ContainerAttributes, MetadataReader, Unavailable};
use crate::types::HostIdentity;

#[derive(Clone)]
struct Entry {
    host: Option<String>,
    attributes: Option<ContainerAttributes>,
}

#[derive(Default)]
struct Inner {
    listing_down: bool,
    host_identity_failures: u32,
    containers: BTreeMap<String, Entry>,
}

/// Clones share the same containers, so a test can keep a handle while the
/// code under test owns another.
#[derive(Clone, Default)]
pub struct FakeMetadata {
    inner: Arc<Mutex<Inner>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container; `floating_ip = None` means the label is absent.
    pub fn container(
        &self,
        name: &str,
        host: &str,
        managed_ip: &str,
        floating_ip: Option<&str>,
    ) {
        let entry = Entry {
            host: Some(host.to_string()),
            attributes: Some(ContainerAttributes {
                uuid: format!("uuid-{}", name),
                managed_ip: managed_ip.to_string(),
                floating_ip: floating_ip.map(str::to_string),
            }),
        };
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), entry);
    }

    /// Listed, but its attributes cannot be read.
    pub fn broken_attributes(&self, name: &str, host: &str) {
        let entry = Entry {
            host: Some(host.to_string()),
            attributes: None,
        };
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), entry);
    }

    /// Listed, but its owning host cannot be read.
    pub fn broken_host(&self, name: &str) {
        let entry = Entry {
            host: None,
            attributes: None,
        };
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), entry);
    }

    pub fn remove(&self, name: &str) {
        self.inner.lock().unwrap().containers.remove(name);
    }

    /// Make the next `count` host identity lookups fail.
    pub fn fail_host_identity(&self, count: u32) {
        self.inner.lock().unwrap().host_identity_failures = count;
    }

    pub fn set_listing_down(&self, down: bool) {
        self.inner.lock().unwrap().listing_down = down;
    }

    fn entry(&self, name: &str) -> Result<Entry, Unavailable> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| Unavailable::new(name, "status 404 Not Found"))
    }
}

#[async_trait]
impl MetadataReader for FakeMetadata {
    async fn host_identity(&self) -> Result<HostIdentity, Unavailable> {
        let mut inner = self.inner.lock().unwrap();
        if inner.host_identity_failures > 0 {
            inner.host_identity_failures -= 1;
            return Err(Unavailable::new("/self/host/uuid", "connection refused"));
        }
        Ok(HostIdentity {
            uuid: "host-a".into(),
            ip: "10.1.0.7".into(),
        })
    }

    async fn list_container_names(&self) -> Result<BTreeSet<String>, Unavailable> {
        let inner = self.inner.lock().unwrap();
        if inner.listing_down {
            return Err(Unavailable::new("/containers", "connection refused"));
        }
        Ok(inner.containers.keys().cloned().collect())
    }

    async fn host_owner_of(&self, name: &str) -> Result<String, Unavailable> {
        self.entry(name)?
            .host
            .ok_or_else(|| Unavailable::new(name, "timed out"))
    }

    async fn attributes_of(&self, name: &str) -> Result<ContainerAttributes, Unavailable> {
        self.entry(name)?
            .attributes
            .ok_or_else(|| Unavailable::new(name, "status 500 Internal Server Error"))
    }
}
