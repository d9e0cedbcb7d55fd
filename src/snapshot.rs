//! Builds the set of floating-IP bindings currently scheduled on this host.

use log::debug;

use crate::metadata::{MetadataReader, Unavailable};
use crate::types::{BindingSet, ContainerBinding, HostIdentity};

pub struct SnapshotBuilder<R> {
    reader: R,
    host: HostIdentity,
}

impl<R: MetadataReader> SnapshotBuilder<R> {
    pub fn new(reader: R, host: HostIdentity) -> Self {
        Self { reader, host }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// Take a fresh snapshot.
    ///
    /// Containers whose owner, attributes or floating-IP label cannot be read
    /// are left out.  Only a failed listing fails the whole snapshot, since
    /// an empty result would otherwise read as "unbind everything".
    pub async fn build(&self) -> Result<BindingSet, Unavailable> {
        let names = self.reader.list_container_names().await?;
        let mut snapshot = BindingSet::new();

        for name in names {
            match self.reader.host_owner_of(&name).await {
                Ok(owner) if owner == self.host.uuid => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    continue;
                }
            }

            if let Some(binding) = self.binding_for(&name).await {
                snapshot.insert(name, binding);
            }
        }

        debug!("Get containers on my host {:?}", snapshot);
        Ok(snapshot)
    }

    async fn binding_for(&self, name: &str) -> Option<ContainerBinding> {
        let attributes = match self.reader.attributes_of(name).await {
            Ok(attributes) => attributes,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                return None;
            }
        };

        Some(ContainerBinding {
            uuid: attributes.uuid,
            name: name.to_string(),
            managed_ip: attributes.managed_ip,
            floating_ip: attributes.floating_ip?,
        })
    }
}
