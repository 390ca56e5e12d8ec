//! Cluster naming.
//!
//! Every host gets one cluster per guest kind, and the two never share a name: a VM
//! and a container may both be called `web`, and guests are only told apart by
//! name within their cluster. An address listed in the override table names the VM
//! cluster verbatim and the container cluster with the container prefix in front of
//! it. Otherwise the name is a kind-specific prefix followed by the host's short name.

use infrasync_common::config::ClusterNaming;
use infrasync_common::models::HostIdentity;
use infrasync_common::net::short_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuestKind {
    Vm,
    Container,
}

impl GuestKind {
    /// Display name of the cluster type grouping this kind of guest.
    pub fn type_name(self) -> &'static str {
        match self {
            GuestKind::Vm => "VirtualBox",
            GuestKind::Container => "Docker",
        }
    }

    pub fn type_slug(self) -> &'static str {
        match self {
            GuestKind::Vm => "virtualbox",
            GuestKind::Container => "docker",
        }
    }
}

/// Cluster names for one host, one per guest kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterNames {
    pub vm: String,
    pub container: String,
}

impl ClusterNames {
    pub fn for_kind(&self, kind: GuestKind) -> &str {
        match kind {
            GuestKind::Vm => &self.vm,
            GuestKind::Container => &self.container,
        }
    }
}

pub struct ClusterResolver {
    naming: ClusterNaming,
}

impl ClusterResolver {
    pub fn new(naming: ClusterNaming) -> Self {
        Self { naming }
    }

    pub fn resolve(&self, host: &HostIdentity, kind: GuestKind) -> String {
        match (self.naming.overrides.get(&host.address), kind) {
            (Some(name), GuestKind::Vm) => name.clone(),
            (Some(name), GuestKind::Container) => format!("{}{name}", self.naming.container_prefix),
            (None, GuestKind::Vm) => format!("{}{}", self.naming.vm_prefix, short_name(&host.name)),
            (None, GuestKind::Container) => {
                format!("{}{}", self.naming.container_prefix, short_name(&host.name))
            }
        }
    }

    pub fn resolve_all(&self, host: &HostIdentity) -> ClusterNames {
        ClusterNames {
            vm: self.resolve(host, GuestKind::Vm),
            container: self.resolve(host, GuestKind::Container),
        }
    }
}
