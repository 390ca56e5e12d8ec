//! # Discovery Service
//!
//! Implements the "discovery cycle" use case: probe every configured host in
//! turn and reconcile whatever each one revealed. When subnets are configured,
//! the cycle ends with a sweep that registers the addresses of known devices.
//!
//! Hosts are processed strictly one after another. A host that fails to probe or
//! to reconcile never affects the next one; only missing credentials or an
//! unreachable inventory end a cycle early.

use std::collections::BTreeMap;
use std::sync::Arc;

use infrasync_common::config::{CredentialTable, Credentials};
use infrasync_common::models::{HostIdentity, HostScanResult};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::cluster::ClusterResolver;
use crate::error::CycleError;
use crate::inventory::Inventory;
use crate::reconcile::{ReconcileSummary, Reconciler, SweepReport};
use crate::scanner::RemoteProber;
use crate::scanner::sweep::SubnetSweeper;

/// Looks up SSH credentials by host name.
pub trait CredentialSource: Send + Sync {
    fn credentials_for(&self, host_name: &str) -> Option<Credentials>;
}

impl CredentialSource for CredentialTable {
    fn credentials_for(&self, host_name: &str) -> Option<Credentials> {
        self.resolve(host_name)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostReport {
    pub result: HostScanResult,
    /// `None` when the host gave nothing to reconcile.
    pub summary: Option<ReconcileSummary>,
}

/// Outcome of one cycle, keyed by host name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub hosts: BTreeMap<String, HostReport>,
    /// `None` when no subnets are swept.
    pub sweep: Option<SweepReport>,
}

impl CycleReport {
    pub fn reachable_count(&self) -> usize {
        self.hosts.values().filter(|h| h.result.reachable).count()
    }

    pub fn totals(&self) -> ReconcileSummary {
        self.hosts
            .values()
            .filter_map(|h| h.summary.as_ref())
            .chain(self.sweep.as_ref().map(|sweep| &sweep.summary))
            .fold(ReconcileSummary::default(), |mut acc, s| {
                acc.created += s.created;
                acc.updated += s.updated;
                acc.unchanged += s.unchanged;
                acc.failed += s.failed;
                acc
            })
    }
}

/// Application service for one discovery cycle.
///
/// Orchestrates:
/// 1. the inventory health check;
/// 2. probing each host through the [`RemoteProber`];
/// 3. reconciling each result through the [`Reconciler`];
/// 4. the optional subnet sweep through the [`SubnetSweeper`].
pub struct DiscoveryService {
    prober: RemoteProber,
    reconciler: Reconciler,
    resolver: ClusterResolver,
    inventory: Arc<dyn Inventory>,
    sweeper: Option<SubnetSweeper>,
}

impl DiscoveryService {
    pub fn new(
        prober: RemoteProber,
        reconciler: Reconciler,
        resolver: ClusterResolver,
        inventory: Arc<dyn Inventory>,
    ) -> Self {
        Self {
            prober,
            reconciler,
            resolver,
            inventory,
            sweeper: None,
        }
    }

    pub fn with_sweeper(mut self, sweeper: SubnetSweeper) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    pub async fn run_cycle(
        &self,
        hosts: &[HostIdentity],
        credentials: &dyn CredentialSource,
    ) -> Result<CycleReport, CycleError> {
        // Credentials are resolved for every host before anything is touched.
        let mut resolved = Vec::with_capacity(hosts.len());
        for host in hosts {
            let creds = credentials
                .credentials_for(&host.name)
                .ok_or_else(|| CycleError::MissingCredentials(host.name.clone()))?;
            resolved.push((host, creds));
        }

        let status = self
            .inventory
            .status()
            .await
            .map_err(CycleError::InventoryUnavailable)?;
        debug!("Inventory status: {status}");

        self.reconciler.ensure_custom_fields().await;

        info!("Discovery cycle started for {} hosts", hosts.len());
        let mut report = CycleReport::default();

        for (host, creds) in resolved {
            let span = info_span!("host", name = %host.name);
            let host_report = self.process_host(host, &creds).instrument(span).await;
            report.hosts.insert(host.name.clone(), host_report);
        }

        if let Some(sweeper) = &self.sweeper {
            let neighbors = sweeper.sweep().instrument(info_span!("sweep")).await;
            report.sweep = Some(self.reconciler.sync_neighbors(&neighbors).await);
        }

        info!(
            "Discovery cycle finished: {} of {} hosts reachable, {}",
            report.reachable_count(),
            hosts.len(),
            report.totals()
        );
        Ok(report)
    }

    async fn process_host(&self, host: &HostIdentity, credentials: &Credentials) -> HostReport {
        let result = self.prober.probe(host, credentials).await;
        if !result.has_signal() {
            warn!("{host} gave no signal, nothing to reconcile");
            return HostReport {
                result,
                summary: None,
            };
        }

        let clusters = self.resolver.resolve_all(host);
        let summary = self.reconciler.reconcile(host, &clusters, &result).await;
        HostReport {
            result,
            summary: Some(summary),
        }
    }
}
