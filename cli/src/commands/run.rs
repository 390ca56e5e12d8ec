use std::path::Path;
use std::time::Duration;

use infrasync_common::config::{Config, ScanConfig};
use tracing::{error, info};

use crate::commands;

/// Runs cycles until interrupted. The configuration is re-read before every
/// cycle; a cycle that cannot start is logged and retried on the next tick.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let mut interval = Duration::from_secs(ScanConfig::default().interval_secs);

    loop {
        match Config::load(config_path) {
            Ok(cfg) => {
                interval = Duration::from_secs(cfg.scan.interval_secs);
                run_once(&cfg).await;
            }
            Err(e) => error!("Skipping cycle, configuration is unusable: {e}"),
        }

        info!("Next cycle in {}s", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn run_once(cfg: &Config) {
    let inventory = match commands::netbox(cfg) {
        Ok(inventory) => inventory,
        Err(e) => {
            error!("Skipping cycle: {e}");
            return;
        }
    };

    let service = commands::discovery_service(cfg, inventory);
    if let Err(e) = service.run_cycle(&cfg.host_identities(), &cfg.credentials).await {
        error!("Cycle aborted: {e}");
    }
}
