//! Data structures shared by the reconciliation agent.
//!
//! A [`ContainerBinding`] records that a container's managed address should
//! carry a floating address.  Bindings are grouped into a [`BindingSet`]
//! keyed by container name; the agent compares two such sets every cycle
//! and expresses the difference as a [`Delta`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of the host this agent runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub uuid: String,
    pub ip: String,
}

/// One container's managed-to-floating address mapping.
///
/// The serialized form is what the downstream network configurator reads,
/// so field names are part of the on-disk contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBinding {
    pub uuid: String,
    pub name: String,
    pub managed_ip: String,
    pub floating_ip: String,
}

/// Bindings keyed by container name.
pub type BindingSet = BTreeMap<String, ContainerBinding>;

/// Bind/unbind operations that move one [`BindingSet`] to another.
///
/// A name normally appears on one side only.  When a container's floating
/// address changes it appears on both: `removed` holds the old binding and
/// `added` the new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub added: BindingSet,
    pub removed: BindingSet,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Apply the delta to `state`: unbinds first, then binds.
    pub fn apply_to(&self, state: &mut BindingSet) {
        for name in self.removed.keys() {
            state.remove(name);
        }
        for (name, binding) in &self.added {
            state.insert(name.clone(), binding.clone());
        }
    }
}

#[cfg(test)]
pub(crate) fn binding(
    name: &str,
    uuid: &str,
    managed_ip: &str,
    floating_ip: &str,
) -> ContainerBinding {
    ContainerBinding {
        uuid: uuid.to_string(),
        name: name.to_string(),
        managed_ip: managed_ip.to_string(),
        floating_ip: floating_ip.to_string(),
    }
}
