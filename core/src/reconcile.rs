//! # Reconciliation Engine
//!
//! Writes one host's scan result into the inventory. Objects are looked up
//! before they are created and only changed fields are ever written, so running
//! the same result twice leaves the inventory untouched the second time.
//!
//! Nothing here is fatal. A failed lookup or write is logged, counted in the
//! [`ReconcileSummary`] and the engine moves on to the next record.

use std::fmt;
use std::sync::Arc;

use infrasync_common::models::{ContainerRecord, DiskRecord, HostIdentity, HostScanResult, VmRecord};
use infrasync_common::net::{is_nat_address, parse_guest_address};
use infrasync_protocols::docker::format_ports;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterNames, GuestKind};
use crate::error::{InventoryError, ReconcileError};
use crate::inventory::{Fields, Filter, Inventory, ObjectKind, Record};

pub mod address;
pub mod fields;
pub mod ipam;

pub use address::{AddressStep, PrimaryAddress};
pub use ipam::SweepReport;
use fields::{diff, merge_custom_fields};

pub const PROVENANCE_COMMENT: &str = "Auto-discovered by infrasync";

const VM_OBJECT_TYPE: &str = "virtualization.virtualmachine";
const DEVICE_OBJECT_TYPE: &str = "dcim.device";

/// A custom attribute the engine writes, with the definition it needs.
struct CustomFieldSpec {
    name: &'static str,
    label: &'static str,
    field_type: &'static str,
    object_type: &'static str,
}

const CUSTOM_FIELDS: &[CustomFieldSpec] = &[
    CustomFieldSpec {
        name: "docker_image",
        label: "Docker image",
        field_type: "text",
        object_type: VM_OBJECT_TYPE,
    },
    CustomFieldSpec {
        name: "docker_created",
        label: "Docker created",
        field_type: "text",
        object_type: VM_OBJECT_TYPE,
    },
    CustomFieldSpec {
        name: "docker_ports",
        label: "Docker ports",
        field_type: "text",
        object_type: VM_OBJECT_TYPE,
    },
    CustomFieldSpec {
        name: "octoprint",
        label: "OctoPrint",
        field_type: "boolean",
        object_type: DEVICE_OBJECT_TYPE,
    },
];

#[derive(Clone, Debug)]
pub struct ReconcileSettings {
    pub interface_name: String,
    pub nat_prefix: String,
    pub address_prefix_len: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// Write counts for one host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    fn record_steps(&mut self, steps: &[AddressStep]) {
        for step in steps {
            match step {
                AddressStep::InterfaceCreated { .. } | AddressStep::AddressCreated { .. } => self.created += 1,
                AddressStep::AlreadyPrimary => self.unchanged += 1,
                _ => self.updated += 1,
            }
        }
    }

    pub fn writes(&self) -> usize {
        self.created + self.updated
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed",
            self.created, self.updated, self.unchanged, self.failed
        )
    }
}

pub struct Reconciler {
    inventory: Arc<dyn Inventory>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(inventory: Arc<dyn Inventory>, settings: ReconcileSettings) -> Self {
        Self {
            inventory,
            settings,
        }
    }

    /// Makes sure every custom attribute the engine writes has a definition.
    /// Failures only cost the attributes that depend on the missing definition.
    pub async fn ensure_custom_fields(&self) {
        for spec in CUSTOM_FIELDS {
            if let Err(e) = self.ensure_custom_field(spec).await {
                warn!("Custom field {} is unavailable: {e}", spec.name);
            }
        }
    }

    async fn ensure_custom_field(&self, spec: &CustomFieldSpec) -> Result<(), InventoryError> {
        let filter = Filter::new().eq("name", spec.name);
        if self.inventory.get(ObjectKind::CustomField, &filter).await?.is_some() {
            return Ok(());
        }

        let fields = object(json!({
            "name": spec.name,
            "label": spec.label,
            "type": spec.field_type,
            "object_types": [spec.object_type],
        }));
        self.inventory.create(ObjectKind::CustomField, fields).await?;
        info!("Created custom field {}", spec.name);
        Ok(())
    }

    pub async fn reconcile(
        &self,
        host: &HostIdentity,
        clusters: &ClusterNames,
        result: &HostScanResult,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        let vm_cluster = if result.vms.is_empty() {
            None
        } else {
            self.prerequisites(host, GuestKind::Vm, &clusters.vm, &mut summary)
                .await
        };
        let container_cluster = if result.containers.is_empty() {
            None
        } else {
            self.prerequisites(host, GuestKind::Container, &clusters.container, &mut summary)
                .await
        };

        self.sync_device(host, result, &mut summary).await;

        match vm_cluster {
            Some(cluster_id) => {
                for vm in &result.vms {
                    self.sync_vm(cluster_id, vm, &mut summary).await;
                }
            }
            None if !result.vms.is_empty() => {
                error!("{}", ReconcileError::ClusterUnavailable { name: clusters.vm.clone() });
                summary.failed += result.vms.len();
            }
            None => {}
        }

        let shared_cluster = clusters.vm == clusters.container;
        match container_cluster {
            Some(cluster_id) => {
                for container in &result.containers {
                    if shared_cluster && result.vms.iter().any(|vm| vm.name == container.name) {
                        warn!(
                            "Container {} shares its name and cluster {} with a VM, skipping",
                            container.name, clusters.container
                        );
                        summary.failed += 1;
                        continue;
                    }
                    self.sync_container(cluster_id, container, &mut summary).await;
                }
            }
            None if !result.containers.is_empty() => {
                error!(
                    "{}",
                    ReconcileError::ClusterUnavailable {
                        name: clusters.container.clone()
                    }
                );
                summary.failed += result.containers.len();
            }
            None => {}
        }

        info!("{}: {summary}", host.name);
        summary
    }

    /// Ensures the cluster type and the cluster for one guest kind. Returns the
    /// cluster id when it exists or could be created.
    async fn prerequisites(
        &self,
        host: &HostIdentity,
        kind: GuestKind,
        cluster_name: &str,
        summary: &mut ReconcileSummary,
    ) -> Option<u64> {
        let type_id = match self.ensure_cluster_type(kind).await {
            Ok((record, outcome)) => {
                summary.record(outcome);
                Some(record.id)
            }
            Err(e) => {
                warn!("Cluster type {} is unavailable: {e}", kind.type_name());
                summary.failed += 1;
                None
            }
        };

        match self.ensure_cluster(host, cluster_name, type_id).await {
            Ok((record, outcome)) => {
                summary.record(outcome);
                Some(record.id)
            }
            Err(e) => {
                warn!("Cluster {cluster_name}: {e}");
                summary.failed += 1;
                None
            }
        }
    }

    async fn ensure_cluster_type(&self, kind: GuestKind) -> Result<(Record, Outcome), InventoryError> {
        let filter = Filter::new().eq("name", kind.type_name());
        if let Some(existing) = self.inventory.get(ObjectKind::ClusterType, &filter).await? {
            return Ok((existing, Outcome::Unchanged));
        }

        let fields = object(json!({ "name": kind.type_name(), "slug": kind.type_slug() }));
        let created = self.inventory.create(ObjectKind::ClusterType, fields).await?;
        info!("Created cluster type {}", kind.type_name());
        Ok((created, Outcome::Created))
    }

    async fn ensure_cluster(
        &self,
        host: &HostIdentity,
        name: &str,
        type_id: Option<u64>,
    ) -> Result<(Record, Outcome), ReconcileError> {
        let filter = Filter::new().eq("name", name);
        if let Some(existing) = self.inventory.get(ObjectKind::Cluster, &filter).await? {
            let Some(comment) = host.comment.as_deref() else {
                return Ok((existing, Outcome::Unchanged));
            };
            let changes = diff(&existing, &object(json!({ "comments": comment })));
            if changes.is_empty() {
                return Ok((existing, Outcome::Unchanged));
            }
            let updated = self
                .inventory
                .update(ObjectKind::Cluster, existing.id, changes)
                .await?;
            return Ok((updated, Outcome::Updated));
        }

        let Some(type_id) = type_id else {
            return Err(ReconcileError::ClusterUnavailable {
                name: name.to_string(),
            });
        };

        let mut fields = object(json!({ "name": name, "type": type_id }));
        if let Some(comment) = host.comment.as_deref() {
            fields.insert("comments".to_string(), json!(comment));
        }
        let created = self.inventory.create(ObjectKind::Cluster, fields).await?;
        info!("Created cluster {name}");
        Ok((created, Outcome::Created))
    }

    /// Writes the disk summary and the signature flag onto the host's device.
    /// Devices are never created here.
    async fn sync_device(&self, host: &HostIdentity, result: &HostScanResult, summary: &mut ReconcileSummary) {
        if result.disks.is_empty() && !result.service_signature_detected {
            return;
        }

        let filter = Filter::new().eq("name", &host.name);
        let device = match self.inventory.get(ObjectKind::Device, &filter).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!("No device named {} in the inventory, skipping disk and service data", host.name);
                return;
            }
            Err(e) => {
                warn!("Device lookup for {} failed: {e}", host.name);
                summary.failed += 1;
                return;
            }
        };

        let mut changes = Fields::new();
        if !result.disks.is_empty() {
            changes.extend(diff(&device, &object(json!({ "comments": render_disks(&result.disks) }))));
        }
        if result.service_signature_detected {
            let flag = object(json!({ "octoprint": true }));
            if let Some(merged) = merge_custom_fields(&device.custom_fields(), &flag) {
                changes.insert("custom_fields".to_string(), Value::Object(merged));
            }
        }

        if changes.is_empty() {
            summary.record(Outcome::Unchanged);
            return;
        }
        match self.inventory.update(ObjectKind::Device, device.id, changes).await {
            Ok(_) => {
                debug!("Updated device {}", host.name);
                summary.record(Outcome::Updated);
            }
            Err(e) => {
                warn!("Device {} was not updated: {e}", host.name);
                summary.failed += 1;
            }
        }
    }

    async fn sync_vm(&self, cluster_id: u64, vm: &VmRecord, summary: &mut ReconcileSummary) {
        let record = match self
            .upsert_guest(cluster_id, &vm.name, vm_fields(vm), Fields::new())
            .await
        {
            Ok((record, outcome)) => {
                summary.record(outcome);
                record
            }
            Err(e) => {
                warn!("VM {} was not synced: {e}", vm.name);
                summary.failed += 1;
                return;
            }
        };

        let Some(address) = vm.guest_address.as_deref().and_then(parse_guest_address) else {
            return;
        };
        if is_nat_address(&address, &self.settings.nat_prefix) {
            debug!("{} only has NAT address {address}", vm.name);
            return;
        }

        let protocol = PrimaryAddress {
            inventory: self.inventory.as_ref(),
            interface_name: &self.settings.interface_name,
            prefix_len: self.settings.address_prefix_len,
        };
        match protocol.assign(&record, address).await {
            Ok(steps) => summary.record_steps(&steps),
            Err(e) => {
                warn!("Primary address {address} for {} was not set: {e}", vm.name);
                summary.failed += 1;
            }
        }
    }

    async fn sync_container(&self, cluster_id: u64, container: &ContainerRecord, summary: &mut ReconcileSummary) {
        let mut scalars = Fields::new();
        if let Some(status) = container.status() {
            scalars.insert("status".to_string(), json!(status.as_str()));
        }

        match self
            .upsert_guest(cluster_id, &container.name, scalars, container_custom_fields(container))
            .await
        {
            Ok((_, outcome)) => summary.record(outcome),
            Err(e) => {
                warn!("Container {} was not synced: {e}", container.name);
                summary.failed += 1;
            }
        }
    }

    /// Creates or updates the VM object `name` inside `cluster_id`. Only fields
    /// that differ are written and custom attributes are merged.
    async fn upsert_guest(
        &self,
        cluster_id: u64,
        name: &str,
        scalars: Fields,
        custom: Fields,
    ) -> Result<(Record, Outcome), ReconcileError> {
        let filter = Filter::new().eq("name", name).eq("cluster_id", cluster_id);
        let existing = self.inventory.get(ObjectKind::VirtualMachine, &filter).await?;

        let Some(existing) = existing else {
            let mut fields = scalars;
            fields.insert("name".to_string(), json!(name));
            fields.insert("cluster".to_string(), json!(cluster_id));
            fields.insert("comments".to_string(), json!(PROVENANCE_COMMENT));
            if !custom.is_empty() {
                fields.insert("custom_fields".to_string(), Value::Object(custom));
            }
            let created = self.inventory.create(ObjectKind::VirtualMachine, fields).await?;
            info!("Created VM {name}");
            return Ok((created, Outcome::Created));
        };

        let mut changes = diff(&existing, &scalars);
        if let Some(merged) = merge_custom_fields(&existing.custom_fields(), &custom) {
            changes.insert("custom_fields".to_string(), Value::Object(merged));
        }
        if changes.is_empty() {
            return Ok((existing, Outcome::Unchanged));
        }

        let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        debug!("Updating VM {name}: {}", keys.join(", "));
        let updated = self
            .inventory
            .update(ObjectKind::VirtualMachine, existing.id, changes)
            .await?;
        Ok((updated, Outcome::Updated))
    }
}

/// Scalar fields observed for a VM this cycle. Unknown values are left out so
/// they never overwrite what the inventory already has.
fn vm_fields(vm: &VmRecord) -> Fields {
    let mut fields = Fields::new();
    if let Some(status) = vm.status() {
        fields.insert("status".to_string(), json!(status.as_str()));
    }
    if let Some(vcpus) = vm.vcpus {
        fields.insert("vcpus".to_string(), json!(vcpus));
    }
    if let Some(memory) = vm.memory_mib {
        fields.insert("memory".to_string(), json!(memory));
    }
    if let Some(disk) = vm.disk_gib {
        // The inventory stores virtual disk size in megabytes.
        fields.insert("disk".to_string(), json!(disk * 1024));
    }
    fields
}

fn container_custom_fields(container: &ContainerRecord) -> Fields {
    let mut fields = Fields::new();
    if !container.image.is_empty() {
        fields.insert("docker_image".to_string(), json!(container.image));
    }
    if !container.created_at.is_empty() {
        fields.insert("docker_created".to_string(), json!(container.created_at));
    }
    let ports = format_ports(&container.raw_port_mapping);
    if !ports.is_empty() {
        fields.insert("docker_ports".to_string(), json!(ports));
    }
    fields
}

/// One line per filesystem, in scan order.
pub fn render_disks(disks: &[DiskRecord]) -> String {
    let lines: Vec<String> = disks
        .iter()
        .map(|disk| {
            format!(
                "{} ({}): {} GiB free of {} GiB",
                disk.mount_point, disk.device, disk.free_gib, disk.total_gib
            )
        })
        .collect();
    format!("Storage:\n{}", lines.join("\n"))
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
