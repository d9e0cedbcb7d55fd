//! fipd daemon entry point.
//!
//! Watches the metadata service for containers on this host that carry the
//! floating-IP label and keeps the binding file read by the network
//! configurator in sync with them.

use log::{error, info, warn};
use tokio::signal;

mod config;
mod control_loop;
mod metadata;
mod readiness;
mod reconcile;
mod snapshot;
mod store;
mod types;

use config::Config;
use control_loop::{resolve_host_identity, ControlLoop};
use metadata::RancherMetadata;
use readiness::{wait_for_upstream, DnsTcpProbe};
use snapshot::SnapshotBuilder;
use store::StateStore;

fn init_logging() {
    // Any value of DEBUG turns on verbose output; RUST_LOG still wins.
    let level = if std::env::var_os("DEBUG").is_some() {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting fipd with config: {:?}", cfg);

    let probe = DnsTcpProbe::from_url(&cfg.metadata_url, cfg.request_timeout())?;
    let reader = RancherMetadata::new(
        &cfg.metadata_url,
        cfg.floating_ip_label.clone(),
        cfg.managed_ip_label.clone(),
        cfg.request_timeout(),
    )?;
    let store = StateStore::new(cfg.output_path.clone());
    match store.load() {
        Ok(previous) if !previous.is_empty() => info!(
            "Found {} bindings from a previous run in {}; they are rebuilt from metadata",
            previous.len(),
            store.path().display()
        ),
        Ok(_) => {}
        Err(e) => warn!("Ignoring unreadable state file {}: {}", store.path().display(), e),
    }

    let backoff = cfg.readiness_backoff();
    let interval = cfg.poll_interval();
    let agent = async move {
        wait_for_upstream(&probe, backoff).await;
        let host = resolve_host_identity(&reader, backoff).await;
        ControlLoop::new(SnapshotBuilder::new(reader, host), store, interval)
            .run()
            .await
    };

    tokio::select! {
        result = agent => {
            if let Err(e) = result {
                error!("Reconciliation stopped: {}", e);
                return Err(e.into());
            }
        }
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
