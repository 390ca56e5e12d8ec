//! Addresses of swept neighbors.
//!
//! A neighbor is matched to a device by the MAC address of one of the device's
//! interfaces. Matched addresses are created on that interface or moved onto
//! it. A MAC no device claims is only reported; devices are never created here.

use infrasync_common::models::NeighborRecord;
use serde_json::json;
use tracing::{info, warn};

use super::address::{AddressBook, Binding};
use super::fields::diff;
use super::{Outcome, ReconcileSummary, Reconciler};
use crate::error::ReconcileError;
use crate::inventory::{Fields, Filter, ObjectKind};

pub const SWEEP_DESCRIPTION: &str = "Discovered by subnet sweep";

/// Outcome of reconciling one sweep.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepReport {
    pub neighbors: usize,
    /// Neighbors whose MAC belongs to no device interface yet.
    pub unregistered: Vec<NeighborRecord>,
    pub summary: ReconcileSummary,
}

impl Reconciler {
    pub async fn sync_neighbors(&self, neighbors: &[NeighborRecord]) -> SweepReport {
        let mut report = SweepReport {
            neighbors: neighbors.len(),
            ..Default::default()
        };

        for neighbor in neighbors {
            match self.sync_neighbor(neighbor, &mut report.summary).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        "Unregistered MAC {} at {}, the device needs staging",
                        neighbor.mac, neighbor.address
                    );
                    report.unregistered.push(neighbor.clone());
                }
                Err(e) => {
                    warn!("Address {} of {} was not synced: {e}", neighbor.address, neighbor.mac);
                    report.summary.failed += 1;
                }
            }
        }

        info!("Sweep: {}", report.summary);
        report
    }

    /// Returns `false` when no device interface carries the neighbor's MAC.
    async fn sync_neighbor(
        &self,
        neighbor: &NeighborRecord,
        summary: &mut ReconcileSummary,
    ) -> Result<bool, ReconcileError> {
        let by_mac = Filter::new().eq("mac_address", &neighbor.mac);
        let Some(interface) = self.inventory.get(ObjectKind::DeviceInterface, &by_mac).await? else {
            return Ok(false);
        };

        let book = AddressBook {
            inventory: self.inventory.as_ref(),
            prefix_len: self.settings.address_prefix_len,
        };
        let mut extra = Fields::new();
        extra.insert("description".to_string(), json!(SWEEP_DESCRIPTION));

        let mut steps = Vec::new();
        let bound = book
            .bind(&neighbor.address, Binding::DeviceInterface(interface.id), extra, &mut steps)
            .await;
        summary.record_steps(&steps);
        let ip = bound?;

        let mut wanted = Fields::new();
        wanted.insert("status".to_string(), json!("active"));
        let changes = diff(&ip, &wanted);
        if !changes.is_empty() {
            self.inventory.update(ObjectKind::IpAddress, ip.id, changes).await?;
            summary.record(Outcome::Updated);
        } else if steps.is_empty() {
            summary.record(Outcome::Unchanged);
        }
        Ok(true)
    }
}
