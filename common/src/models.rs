//! # Scan Models
//!
//! Records built fresh on every cycle from live command output. None of them are
//! persisted locally; they only live long enough to be reconciled into the inventory.

use std::fmt;
use std::net::IpAddr;

/// A scan target as listed in the configuration.
///
/// `name` is the join key into credential overrides and the expected device name in
/// the inventory. `address` is what the shell and HTTP probes connect to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostIdentity {
    pub name: String,
    pub address: String,
    pub comment: Option<String>,
}

impl HostIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Status written to the inventory for a discovered guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuestStatus {
    Active,
    Offline,
}

impl GuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestStatus::Active => "active",
            GuestStatus::Offline => "offline",
        }
    }
}

/// One hypervisor guest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VmRecord {
    pub name: String,
    pub memory_mib: Option<u64>,
    /// Fractional because the hypervisor may report partial cores.
    pub vcpus: Option<f64>,
    pub disk_gib: Option<u64>,
    pub guest_address: Option<String>,
    pub state: Option<String>,
}

impl VmRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Maps the hypervisor run state onto an inventory status.
    ///
    /// Unknown states yield `None` so the existing status is left alone.
    pub fn status(&self) -> Option<GuestStatus> {
        match self.state.as_deref()? {
            "running" => Some(GuestStatus::Active),
            "poweroff" | "aborted" | "saved" | "paused" => Some(GuestStatus::Offline),
            _ => None,
        }
    }
}

/// One container as reported by the container runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub created_at: String,
    pub raw_port_mapping: String,
    pub state: Option<String>,
}

impl ContainerRecord {
    pub fn status(&self) -> Option<GuestStatus> {
        match self.state.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("running") => Some(GuestStatus::Active),
            Some(_) => Some(GuestStatus::Offline),
        }
    }
}

/// One filesystem or logical volume on the scanned host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskRecord {
    pub device: String,
    pub total_gib: u64,
    pub free_gib: u64,
    pub mount_point: String,
}

/// Everything learned about one host during a cycle.
///
/// When `reachable` is false the collections are empty, but
/// `service_signature_detected` may still be set: the HTTP probe does not
/// depend on the shell session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostScanResult {
    pub reachable: bool,
    pub vms: Vec<VmRecord>,
    pub containers: Vec<ContainerRecord>,
    pub disks: Vec<DiskRecord>,
    pub service_signature_detected: bool,
}

impl HostScanResult {
    pub fn unreachable(service_signature_detected: bool) -> Self {
        Self {
            service_signature_detected,
            ..Default::default()
        }
    }

    /// True when the host produced anything worth reconciling.
    pub fn has_signal(&self) -> bool {
        self.reachable || self.service_signature_detected
    }
}

/// A neighbor answering on the local segment during a subnet sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborRecord {
    pub address: IpAddr,
    /// Upper-case, colon separated (`AA:BB:CC:00:11:22`).
    pub mac: String,
}
