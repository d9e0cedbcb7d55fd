//! One-time gate that holds startup until the metadata service is reachable.
//!
//! The metadata host is normally an internal DNS name that only resolves
//! once the host's network agent is up, so the probe resolves the name and
//! then opens a TCP connection to the service port.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::{debug, info, warn};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

#[async_trait]
pub trait UpstreamProbe {
    /// Short description of what is probed, used in log lines.
    fn target(&self) -> String;

    async fn probe(&self) -> Result<()>;
}

/// Resolves the upstream host name and connects to it.
pub struct DnsTcpProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
    resolver: TokioAsyncResolver,
}

impl DnsTcpProbe {
    pub fn from_url(url: &str, connect_timeout: Duration) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| anyhow!("Invalid metadata url {}: {}", url, e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow!("Metadata url {} has no host", url))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow!("Metadata url {} has no port", url))?;
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!(
                "Failed to load system resolv.conf: {}. Falling back to default resolvers.",
                e
            );
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });

        Ok(Self {
            host,
            port,
            connect_timeout,
            resolver,
        })
    }
}

#[async_trait]
impl UpstreamProbe for DnsTcpProbe {
    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn probe(&self) -> Result<()> {
        let lookup = self.resolver.lookup_ip(self.host.as_str()).await?;
        let addr = lookup
            .iter()
            .next()
            .ok_or_else(|| anyhow!("{} resolved to no addresses", self.host))?;
        debug!("Resolved {} to {}", self.host, addr);

        timeout(self.connect_timeout, TcpStream::connect((addr, self.port)))
            .await
            .map_err(|_| anyhow!("connect to {}:{} timed out", addr, self.port))??;
        Ok(())
    }
}

/// Block until `probe` succeeds, retrying every `backoff`.
pub async fn wait_for_upstream<P: UpstreamProbe + ?Sized>(probe: &P, backoff: Duration) -> u32 {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match probe.probe().await {
            Ok(()) => {
                info!("Upstream {} reachable", probe.target());
                return attempts;
            }
            Err(e) => {
                info!(
                    "Retry resolving upstream `{}` in {:?}: {}",
                    probe.target(),
                    backoff,
                    e
                );
                sleep(backoff).await;
            }
        }
    }
}
