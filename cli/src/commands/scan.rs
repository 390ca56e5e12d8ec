use std::sync::Arc;
use std::time::Instant;

use colored::*;
use infrasync_common::config::Config;
use infrasync_core::inventory::Inventory;
use infrasync_core::inventory::memory::MemoryInventory;
use tracing::error;

use crate::commands;
use crate::terminal::{print, spinner};

pub async fn scan(cfg: &Config, dry_run: bool) -> anyhow::Result<()> {
    let memory = Arc::new(MemoryInventory::new());
    let inventory: Arc<dyn Inventory> = if dry_run {
        memory.clone()
    } else {
        commands::netbox(cfg)?
    };

    let hosts = cfg.host_identities();
    let service = commands::discovery_service(cfg, inventory);

    spinner::start(format!(
        "Probing {} hosts...",
        hosts.len().to_string().green().bold()
    ));
    let start_time = Instant::now();
    let outcome = service.run_cycle(&hosts, &cfg.credentials).await;
    spinner::finish();

    match outcome {
        Ok(report) => {
            print::report(&report, start_time.elapsed());
            if dry_run {
                print::planned_writes(&memory.operations());
            }
        }
        Err(e) => error!("Cycle aborted: {e}"),
    }
    Ok(())
}
