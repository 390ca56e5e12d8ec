use anyhow::Context;
use infrasync_common::config::{Config, mask_secret};
use infrasync_core::inventory::netbox::NetboxClient;
use infrasync_core::inventory::{Filter, Inventory, ObjectKind};
use serde_json::Value;
use tracing::{debug, info};

use crate::commands;

const CHECK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Fetches the status document, then proves read access with one cluster type lookup.
pub async fn check(cfg: &Config) -> anyhow::Result<()> {
    let endpoint = commands::endpoint(cfg)?;
    debug!("Using {} with token {}", endpoint.url, mask_secret(&endpoint.token));

    let client = NetboxClient::new(&endpoint, CHECK_TIMEOUT)?;
    let status = client
        .status()
        .await
        .with_context(|| format!("NetBox at {} is not answering", endpoint.url))?;
    let version = status
        .get("netbox-version")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!("Connected to NetBox {version}");

    client
        .get(ObjectKind::ClusterType, &Filter::new().eq("slug", "virtualbox"))
        .await
        .context("token cannot read cluster types")?;
    info!("Read access verified");
    Ok(())
}
