//! The reconciliation loop.
//!
//! Each cycle takes a fresh snapshot, diffs it against the bindings last
//! handed to the downstream configurator, applies the unbinds and binds to
//! that accepted state, and persists the result.  Unreadable metadata and
//! failed writes are retried by simply running the next cycle; anything else
//! ends the loop without touching the state file again.

use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::sleep;

use crate::metadata::MetadataReader;
use crate::reconcile::diff;
use crate::snapshot::SnapshotBuilder;
use crate::store::{PersistError, StateStore};
use crate::types::{BindingSet, Delta, HostIdentity};

/// Errors that end the loop.
///
/// The only source today is a state that fails to encode as JSON. A
/// `BTreeMap` of string records always encodes, so in practice the loop
/// stops only by panic or process termination.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Not a transient upstream or disk problem; the process should exit.
    #[error("unexpected error, stopping: {0}")]
    Unexpected(#[source] PersistError),
}

/// Outcome of a single cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// `false` when the container listing could not be read and the accepted
    /// state was carried over unchanged.
    pub snapshot_taken: bool,
    pub delta: Delta,
    pub persisted: bool,
}

pub struct ControlLoop<R> {
    builder: SnapshotBuilder<R>,
    store: StateStore,
    interval: Duration,
    accepted: BindingSet,
}

impl<R: MetadataReader> ControlLoop<R> {
    /// Start with an empty accepted state.
    pub fn new(builder: SnapshotBuilder<R>, store: StateStore, interval: Duration) -> Self {
        Self {
            builder,
            store,
            interval,
            accepted: BindingSet::new(),
        }
    }

    /// Bindings last handed to the downstream configurator.
    pub fn accepted(&self) -> &BindingSet {
        &self.accepted
    }

    /// Run cycles forever; returns only on an unexpected error.
    pub async fn run(mut self) -> Result<(), CycleError> {
        info!(
            "Reconciling floating ips for host {} ({}) every {:?} into {}",
            self.builder.host().uuid,
            self.builder.host().ip,
            self.interval,
            self.store.path().display()
        );

        loop {
            let report = self.run_cycle().await?;
            debug!(
                "Cycle done: snapshot={} changed={} added={} removed={} persisted={} accepted={}",
                report.snapshot_taken,
                !report.delta.is_empty(),
                report.delta.added.len(),
                report.delta.removed.len(),
                report.persisted,
                self.accepted().len()
            );
            sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();

        match self.builder.build().await {
            Ok(current) => {
                report.snapshot_taken = true;
                report.delta = diff(&self.accepted, &current);
                self.apply(&report.delta);
            }
            Err(e) => {
                warn!("Container listing unavailable, keeping previous state: {}", e);
            }
        }

        match self.store.persist(&self.accepted) {
            Ok(()) => report.persisted = true,
            Err(e @ PersistError::Io { .. }) => {
                warn!("Failed to persist floating ip state, will retry: {}", e);
            }
            Err(e) => return Err(CycleError::Unexpected(e)),
        }

        Ok(report)
    }

    fn apply(&mut self, delta: &Delta) {
        for (name, binding) in &delta.removed {
            info!(
                "Unbind floating ip for {}: {} to {}",
                name, binding.floating_ip, binding.managed_ip
            );
        }
        for (name, binding) in &delta.added {
            info!(
                "Bind floating ip for {}: {} to {}",
                name, binding.floating_ip, binding.managed_ip
            );
        }
        delta.apply_to(&mut self.accepted);
    }
}

/// Resolve this host's identity, retrying every `backoff` until it succeeds.
pub async fn resolve_host_identity<R: MetadataReader>(
    reader: &R,
    backoff: Duration,
) -> HostIdentity {
    loop {
        match reader.host_identity().await {
            Ok(identity) => {
                info!("Running on host {} ({})", identity.uuid, identity.ip);
                return identity;
            }
            Err(e) => {
                warn!("Host identity unavailable, retrying in {:?}: {}", backoff, e);
                sleep(backoff).await;
            }
        }
    }
}
