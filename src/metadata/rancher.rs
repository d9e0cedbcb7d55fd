use super::{ContainerAttributes, MetadataReader, Unavailable};
use crate::types::HostIdentity;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use std::collections::BTreeSet;
use std::time::Duration;

/// Reads container placement and labels from the Rancher metadata service.
///
/// Every endpoint answers with a plain-text body: scalars as a single value,
/// collections as one entry per line.
pub struct RancherMetadata {
    client: Client,
    base: Url,
    floating_ip_label: String,
    managed_ip_label: String,
}

impl RancherMetadata {
    pub fn new(
        base_url: &str,
        floating_ip_label: impl Into<String>,
        managed_ip_label: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| anyhow!("Invalid metadata url {}: {}", base_url, e))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("Metadata url {} cannot carry a path", base_url));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base,
            floating_ip_label: floating_ip_label.into(),
            managed_ip_label: managed_ip_label.into(),
        })
    }

    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base() was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Raw body of a successful GET.
    async fn get_text(&self, segments: &[&str]) -> Result<String, Unavailable> {
        let url = self.url_for(segments);
        let path = url.path().to_string();

        let response = self.client.get(url).send().await.map_err(|e| {
            debug!("GET {} failed: {}", path, e);
            Unavailable::new(&path, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Unavailable::new(path, format!("status {}", status)));
        }

        response.text().await.map_err(|e| Unavailable::new(path, e))
    }

    /// A single non-empty scalar value.
    async fn get_value(&self, segments: &[&str]) -> Result<String, Unavailable> {
        let text = self.get_text(segments).await?;
        let value = text.trim();
        if value.is_empty() {
            let path = self.url_for(segments).path().to_string();
            return Err(Unavailable::new(path, "empty value"));
        }
        Ok(value.to_string())
    }
}

#[async_trait]
impl MetadataReader for RancherMetadata {
    async fn host_identity(&self) -> Result<HostIdentity, Unavailable> {
        let uuid = self.get_value(&["self", "host", "uuid"]).await?;
        debug!("Get host uuid {}", uuid);
        let ip = self.get_value(&["self", "host", "agent_ip"]).await?;
        debug!("Get host ip {}", ip);
        Ok(HostIdentity { uuid, ip })
    }

    async fn list_container_names(&self) -> Result<BTreeSet<String>, Unavailable> {
        let body = self.get_text(&["containers"]).await?;
        let names = parse_container_listing(&body);
        debug!("Get containers {:?}", names);
        Ok(names)
    }

    async fn host_owner_of(&self, name: &str) -> Result<String, Unavailable> {
        self.get_value(&["containers", name, "host_uuid"]).await
    }

    async fn attributes_of(&self, name: &str) -> Result<ContainerAttributes, Unavailable> {
        let uuid = self.get_value(&["containers", name, "uuid"]).await?;
        let managed_ip = self
            .get_value(&["containers", name, "labels", &self.managed_ip_label])
            .await?;

        let labels = self.get_text(&["containers", name, "labels"]).await?;
        let floating_ip = if has_label(&labels, &self.floating_ip_label) {
            Some(
                self.get_value(&["containers", name, "labels", &self.floating_ip_label])
                    .await?,
            )
        } else {
            None
        };

        Ok(ContainerAttributes {
            uuid,
            managed_ip,
            floating_ip,
        })
    }
}

/// Parse the `index=name` listing returned by `/containers`.
fn parse_container_listing(body: &str) -> BTreeSet<String> {
    body.lines()
        .filter_map(|line| {
            let (_, name) = line.split_once('=')?;
            let name = name.trim();
            if name.is_empty() || name.contains('=') {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}

fn has_label(listing: &str, label: &str) -> bool {
    listing.lines().any(|line| line.trim() == label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIP_LABEL: &str = "io.rancher.container.floating.ip";
    const IP_LABEL: &str = "io.rancher.container.ip";

    async fn reader(server: &MockServer) -> RancherMetadata {
        RancherMetadata::new(
            &format!("{}/2015-07-25", server.uri()),
            FIP_LABEL,
            IP_LABEL,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    async fn serve(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/2015-07-25{}", at)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn listing_skips_malformed_lines() {
        let names = parse_container_listing("0=Network Agent\n1=web_1\ngarbage\n2=\n3=a=b\n");
        let expected: BTreeSet<String> = ["Network Agent", "web_1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn rejects_non_base_url() {
        let result = RancherMetadata::new(
            "mailto:ops@example.com",
            FIP_LABEL,
            IP_LABEL,
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resolves_host_identity() {
        let server = MockServer::start().await;
        serve(&server, "/self/host/uuid", "host-a\n").await;
        serve(&server, "/self/host/agent_ip", "10.1.0.7").await;

        let identity = reader(&server).await.host_identity().await.unwrap();
        assert_eq!(
            identity,
            HostIdentity {
                uuid: "host-a".into(),
                ip: "10.1.0.7".into()
            }
        );
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2015-07-25/containers/web_1/host_uuid"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = reader(&server).await.host_owner_of("web_1").await.unwrap_err();
        assert!(err.reason.contains("404"));
    }

    #[tokio::test]
    async fn empty_scalar_is_unavailable() {
        let server = MockServer::start().await;
        serve(&server, "/containers/web_1/host_uuid", "  \n").await;

        let err = reader(&server).await.host_owner_of("web_1").await.unwrap_err();
        assert_eq!(err.path, "/2015-07-25/containers/web_1/host_uuid");
        assert_eq!(err.reason, "empty value");
    }

    #[tokio::test]
    async fn connection_failure_is_unavailable() {
        let server = MockServer::start().await;
        let reader = reader(&server).await;
        drop(server);

        assert!(reader.list_container_names().await.is_err());
    }

    #[tokio::test]
    async fn reads_floating_ip_when_labelled() {
        let server = MockServer::start().await;
        serve(&server, "/containers/web_1/uuid", "u-1").await;
        let labels = format!("{}\n{}\nio.rancher.stack.name\n", IP_LABEL, FIP_LABEL);
        serve(&server, "/containers/web_1/labels", &labels).await;
        let ip_path = format!("/containers/web_1/labels/{}", IP_LABEL);
        serve(&server, &ip_path, "10.42.0.5").await;
        let fip_path = format!("/containers/web_1/labels/{}", FIP_LABEL);
        serve(&server, &fip_path, "192.168.1.50").await;

        let attrs = reader(&server).await.attributes_of("web_1").await.unwrap();
        assert_eq!(
            attrs,
            ContainerAttributes {
                uuid: "u-1".into(),
                managed_ip: "10.42.0.5".into(),
                floating_ip: Some("192.168.1.50".into()),
            }
        );
    }

    #[tokio::test]
    async fn missing_label_means_no_floating_ip() {
        let server = MockServer::start().await;
        serve(&server, "/containers/db_1/uuid", "u-2").await;
        serve(&server, "/containers/db_1/labels", &format!("{}\n", IP_LABEL)).await;
        let ip_path = format!("/containers/db_1/labels/{}", IP_LABEL);
        serve(&server, &ip_path, "10.42.0.6").await;

        let attrs = reader(&server).await.attributes_of("db_1").await.unwrap();
        assert_eq!(attrs.floating_ip, None);
    }
}
