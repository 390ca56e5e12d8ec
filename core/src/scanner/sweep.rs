//! Subnet sweep.
//!
//! Runs an ARP ping sweep over each configured subnet from this machine and
//! collects every neighbor that answered with a MAC address.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use infrasync_common::models::NeighborRecord;
use infrasync_protocols::{OutputFormat, nmap};
use tracing::{debug, info, warn};

use crate::network::CommandRunner;

#[derive(Clone, Debug)]
pub struct SweepSettings {
    pub subnets: Vec<String>,
    pub timeout: Duration,
}

pub struct SubnetSweeper {
    runner: Arc<dyn CommandRunner>,
    settings: SweepSettings,
}

impl SubnetSweeper {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: SweepSettings) -> Self {
        Self { runner, settings }
    }

    /// Sweeps every subnet in turn. A subnet that cannot be swept is logged and
    /// skipped. An address seen twice keeps the MAC it was first seen with.
    pub async fn sweep(&self) -> Vec<NeighborRecord> {
        let mut found: BTreeMap<IpAddr, NeighborRecord> = BTreeMap::new();

        for subnet in &self.settings.subnets {
            let output = match self
                .runner
                .run(nmap::PROGRAM, &nmap::sweep_args(subnet), self.settings.timeout)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!("Sweep of {subnet} failed: {e}");
                    continue;
                }
            };
            if output.exit_status != Some(0) {
                warn!(
                    "Sweep of {subnet} exited with {:?}: {}",
                    output.exit_status,
                    output.stderr.trim()
                );
                continue;
            }

            let neighbors = OutputFormat::NeighborSweep
                .parse(&output.stdout)
                .into_neighbors();
            info!("{subnet}: {} neighbors answered", neighbors.len());
            for neighbor in neighbors {
                found.entry(neighbor.address).or_insert(neighbor);
            }
        }

        debug!("Sweep found {} distinct neighbors", found.len());
        found.into_values().collect()
    }
}
