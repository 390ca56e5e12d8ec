//! Primary-address protocol.
//!
//! The inventory refuses to move an address while a VM or device still names it
//! as primary, and refuses a primary that is not assigned to one of the object's
//! own interfaces. Moving an address therefore runs in a fixed order:
//!
//! 1. ensure the VM's interface exists;
//! 2. find the address by its host part, whatever mask it was stored with, or
//!    create it;
//! 3. if the address is bound to any other interface, VM or device, detach it
//!    from the object holding it as primary, then rebind it to this interface;
//! 4. promote it to `primary_ip4` or `primary_ip6` unless it already is.
//!
//! Each write is reported as an [`AddressStep`] so callers can observe the order.

use std::net::IpAddr;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::inventory::{Fields, Filter, Inventory, ObjectKind, Record};

pub const VM_INTERFACE_TYPE: &str = "virtualization.vminterface";
pub const DEVICE_INTERFACE_TYPE: &str = "dcim.interface";

const IPV6_PREFIX_LEN: u8 = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressStep {
    InterfaceCreated { interface_id: u64 },
    AddressCreated { address_id: u64 },
    /// The previous owner no longer names the address as primary.
    Detached { owner: ObjectKind, owner_id: u64 },
    Rebound { interface_id: u64 },
    Promoted { address_id: u64 },
    AlreadyPrimary,
}

impl AddressStep {
    pub fn is_write(&self) -> bool {
        !matches!(self, AddressStep::AlreadyPrimary)
    }
}

/// The interface an address object is assigned to. The numeric id alone is
/// ambiguous: VM interfaces and device interfaces are numbered independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    VmInterface(u64),
    DeviceInterface(u64),
}

impl Binding {
    pub fn of(ip: &Record) -> Option<Self> {
        let id = ip.ref_id("assigned_object_id")?;
        match ip.str_field("assigned_object_type")? {
            VM_INTERFACE_TYPE => Some(Binding::VmInterface(id)),
            DEVICE_INTERFACE_TYPE => Some(Binding::DeviceInterface(id)),
            _ => None,
        }
    }

    pub fn interface_id(self) -> u64 {
        match self {
            Binding::VmInterface(id) | Binding::DeviceInterface(id) => id,
        }
    }

    fn object_type(self) -> &'static str {
        match self {
            Binding::VmInterface(_) => VM_INTERFACE_TYPE,
            Binding::DeviceInterface(_) => DEVICE_INTERFACE_TYPE,
        }
    }

    fn interface_kind(self) -> ObjectKind {
        match self {
            Binding::VmInterface(_) => ObjectKind::VmInterface,
            Binding::DeviceInterface(_) => ObjectKind::DeviceInterface,
        }
    }

    /// The kind owning the interface and the interface field naming it.
    fn owner(self) -> (ObjectKind, &'static str) {
        match self {
            Binding::VmInterface(_) => (ObjectKind::VirtualMachine, "virtual_machine"),
            Binding::DeviceInterface(_) => (ObjectKind::Device, "device"),
        }
    }

    fn fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("assigned_object_type".to_string(), json!(self.object_type()));
        fields.insert("assigned_object_id".to_string(), json!(self.interface_id()));
        fields
    }
}

/// The primary-address field matching the address family.
pub fn primary_field(address: &IpAddr) -> &'static str {
    match address {
        IpAddr::V4(_) => "primary_ip4",
        IpAddr::V6(_) => "primary_ip6",
    }
}

/// Finds, creates and rebinds address objects.
pub struct AddressBook<'a> {
    pub inventory: &'a dyn Inventory,
    /// Mask for new IPv4 addresses. New IPv6 addresses get a /64.
    pub prefix_len: u8,
}

impl AddressBook<'_> {
    pub fn cidr(&self, address: &IpAddr) -> String {
        let prefix_len = match address {
            IpAddr::V4(_) => self.prefix_len,
            IpAddr::V6(_) => IPV6_PREFIX_LEN,
        };
        infrasync_common::net::with_prefix_len(address, prefix_len)
    }

    /// Looks an address up by its host part, so `10.0.0.5` finds `10.0.0.5/32` too.
    pub async fn find(&self, address: &IpAddr) -> Result<Option<Record>, ReconcileError> {
        let filter = Filter::new().eq("address", address);
        Ok(self.inventory.get(ObjectKind::IpAddress, &filter).await?)
    }

    /// Makes sure `address` exists and is assigned to `binding`. A new address
    /// also gets `extra`. An existing one keeps its mask.
    pub async fn bind(
        &self,
        address: &IpAddr,
        binding: Binding,
        extra: Fields,
        steps: &mut Vec<AddressStep>,
    ) -> Result<Record, ReconcileError> {
        let Some(ip) = self.find(address).await? else {
            let cidr = self.cidr(address);
            let mut fields = binding.fields();
            fields.insert("address".to_string(), json!(cidr));
            fields.insert("status".to_string(), json!("active"));
            fields.extend(extra);
            let ip = self.inventory.create(ObjectKind::IpAddress, fields).await?;
            info!("Registered {cidr}");
            steps.push(AddressStep::AddressCreated { address_id: ip.id });
            return Ok(ip);
        };

        if Binding::of(&ip) == Some(binding) {
            return Ok(ip);
        }

        if let Some((owner, owner_id)) = self.detach(&ip).await? {
            steps.push(AddressStep::Detached { owner, owner_id });
        }
        let ip = self
            .inventory
            .update(ObjectKind::IpAddress, ip.id, binding.fields())
            .await?;
        info!(
            "Moved {} to {} #{}",
            ip.str_field("address").unwrap_or_default(),
            binding.interface_kind(),
            binding.interface_id()
        );
        steps.push(AddressStep::Rebound {
            interface_id: binding.interface_id(),
        });
        Ok(ip)
    }

    /// Clears every primary reference to `ip` held by the VM or device owning the
    /// interface it is currently assigned to. Returns that owner when something
    /// was cleared.
    async fn detach(&self, ip: &Record) -> Result<Option<(ObjectKind, u64)>, ReconcileError> {
        let Some(binding) = Binding::of(ip) else {
            return Ok(None);
        };
        let (owner_kind, owner_field) = binding.owner();

        let by_id = Filter::new().eq("id", binding.interface_id());
        let Some(interface) = self.inventory.get(binding.interface_kind(), &by_id).await? else {
            return Ok(None);
        };
        let Some(owner_id) = interface.ref_id(owner_field) else {
            return Ok(None);
        };
        let Some(owner) = self
            .inventory
            .get(owner_kind, &Filter::new().eq("id", owner_id))
            .await?
        else {
            return Ok(None);
        };

        let changes: Fields = ["primary_ip4", "primary_ip6"]
            .into_iter()
            .filter(|field| owner.ref_id(field) == Some(ip.id))
            .map(|field| (field.to_string(), Value::Null))
            .collect();
        if changes.is_empty() {
            return Ok(None);
        }

        self.inventory.update(owner_kind, owner.id, changes).await?;
        info!("Cleared primary address of {owner_kind} #{}", owner.id);
        Ok(Some((owner_kind, owner.id)))
    }
}

pub struct PrimaryAddress<'a> {
    pub inventory: &'a dyn Inventory,
    pub interface_name: &'a str,
    pub prefix_len: u8,
}

impl PrimaryAddress<'_> {
    /// Runs the protocol for `vm`. Writes completed before a failure stay applied.
    pub async fn assign(&self, vm: &Record, address: IpAddr) -> Result<Vec<AddressStep>, ReconcileError> {
        let mut steps = Vec::new();
        let field = primary_field(&address);
        let book = AddressBook {
            inventory: self.inventory,
            prefix_len: self.prefix_len,
        };

        let interface = self.ensure_interface(vm, &mut steps).await?;
        let ip = book
            .bind(&address, Binding::VmInterface(interface.id), Fields::new(), &mut steps)
            .await?;

        let detached_here = steps.iter().any(|step| {
            matches!(step, AddressStep::Detached { owner: ObjectKind::VirtualMachine, owner_id }
                if *owner_id == vm.id)
        });
        if !detached_here && vm.ref_id(field) == Some(ip.id) {
            steps.push(AddressStep::AlreadyPrimary);
            return Ok(steps);
        }

        let mut changes = Fields::new();
        changes.insert(field.to_string(), json!(ip.id));
        self.inventory
            .update(ObjectKind::VirtualMachine, vm.id, changes)
            .await?;
        info!("{address} is now {field} for VM #{}", vm.id);
        steps.push(AddressStep::Promoted { address_id: ip.id });
        Ok(steps)
    }

    async fn ensure_interface(&self, vm: &Record, steps: &mut Vec<AddressStep>) -> Result<Record, ReconcileError> {
        let filter = Filter::new()
            .eq("virtual_machine_id", vm.id)
            .eq("name", self.interface_name);
        if let Some(interface) = self.inventory.get(ObjectKind::VmInterface, &filter).await? {
            return Ok(interface);
        }

        let mut fields = Fields::new();
        fields.insert("virtual_machine".to_string(), json!(vm.id));
        fields.insert("name".to_string(), json!(self.interface_name));
        let interface = self.inventory.create(ObjectKind::VmInterface, fields).await?;
        debug!("Created interface {} on VM #{}", self.interface_name, vm.id);
        steps.push(AddressStep::InterfaceCreated {
            interface_id: interface.id,
        });
        Ok(interface)
    }
}
