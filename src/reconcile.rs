//! Snapshot comparison.
//!
//! [`diff`] is pure: it looks only at the two sets it is given and never at
//! the metadata service or the state file.  Any change to an existing
//! binding, most importantly its floating address, is reported as an unbind
//! of the old binding plus a bind of the new one so the downstream
//! configurator never sees a binding mutate in place.

use log::debug;

use crate::types::{BindingSet, Delta};

/// Compute the operations that turn `previous` into `current`.
pub fn diff(previous: &BindingSet, current: &BindingSet) -> Delta {
    let mut delta = Delta::default();

    for (name, old) in previous {
        match current.get(name) {
            None => {
                debug!("{} needs removal from this host", name);
                delta.removed.insert(name.clone(), old.clone());
            }
            Some(new) if new != old => {
                debug!(
                    "{} changed binding {} -> {} (was {} -> {})",
                    name, new.floating_ip, new.managed_ip, old.floating_ip, old.managed_ip
                );
                delta.removed.insert(name.clone(), old.clone());
                delta.added.insert(name.clone(), new.clone());
            }
            Some(_) => {}
        }
    }

    for (name, new) in current {
        if !previous.contains_key(name) {
            debug!("{} needs adding to this host", name);
            delta.added.insert(name.clone(), new.clone());
        }
    }

    delta
}
