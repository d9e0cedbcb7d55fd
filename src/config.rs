use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the metadata service, including the API version.
    pub metadata_url: String,
    /// Seconds between reconciliation cycles.
    pub poll_interval_secs: u64,
    /// File read by the downstream network configurator.
    pub output_path: PathBuf,
    /// Label whose presence marks a container as wanting a floating IP.
    pub floating_ip_label: String,
    /// Label carrying the container's managed IP.
    pub managed_ip_label: String,
    /// Seconds between readiness probes while waiting for the metadata service.
    pub readiness_backoff_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_url: "http://rancher-metadata.rancher.internal/2015-07-25".into(),
            poll_interval_secs: 2,
            output_path: "/var/run/docker/emc_fip_db.json".into(),
            floating_ip_label: "io.rancher.container.floating.ip".into(),
            managed_ip_label: "io.rancher.container.ip".into(),
            readiness_backoff_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("fipd.toml"))
                .merge(Json::file("fipd.json"))
                .merge(Env::prefixed("FIPD_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if config.readiness_backoff_secs == 0 {
            anyhow::bail!("readiness_backoff_secs must be at least 1");
        }
        if config.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        if config.floating_ip_label.trim().is_empty() {
            anyhow::bail!("floating_ip_label must not be empty");
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn readiness_backoff(&self) -> Duration {
        Duration::from_secs(self.readiness_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
