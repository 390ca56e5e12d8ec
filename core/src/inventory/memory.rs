//! In-process inventory.
//!
//! Keeps every object in memory and records each write in an ordered log. Used for
//! `scan --dry-run` and as the inventory behind the reconciler tests. It enforces the
//! two primary-address rules the real inventory enforces, for VMs and devices alike:
//!
//! * an address cannot be moved while some object still names it as primary;
//! * an object can only name an address as primary once it sits on one of its
//!   own interfaces.
//!
//! Address lookups follow the inventory too: `address=10.0.0.5` matches any mask,
//! `address=10.0.0.5/24` only that one.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Fields, Filter, Inventory, ObjectKind, Record, value_id};
use crate::error::InventoryError;
use crate::reconcile::address::{DEVICE_INTERFACE_TYPE, VM_INTERFACE_TYPE};

const PRIMARY_FIELDS: [&str; 2] = ["primary_ip4", "primary_ip6"];

/// A write the inventory has accepted, in the order it was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Create { kind: ObjectKind, id: u64, fields: Fields },
    Update { kind: ObjectKind, id: u64, changes: Fields },
}

impl Operation {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Operation::Create { kind, .. } | Operation::Update { kind, .. } => *kind,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Operation::Create { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    Get,
    Create,
    Update,
}

#[derive(Default)]
struct State {
    next_id: u64,
    records: BTreeMap<ObjectKind, BTreeMap<u64, Record>>,
    log: Vec<Operation>,
    failures: HashSet<(ObjectKind, Call)>,
    offline: bool,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, kind: ObjectKind, call: Call) -> Result<(), InventoryError> {
        if self.offline {
            return Err(offline(kind.api_path()));
        }
        if self.failures.contains(&(kind, call)) {
            return Err(InventoryError::Status {
                path: kind.api_path().to_string(),
                status: 500,
                body: format!("injected {call:?} failure"),
            });
        }
        Ok(())
    }

    fn record(&self, kind: ObjectKind, id: u64) -> Option<&Record> {
        self.records.get(&kind).and_then(|records| records.get(&id))
    }

    fn insert(&mut self, kind: ObjectKind, fields: Fields) -> Record {
        let id = self.allocate_id();
        let mut stored = fields.clone();
        stored.insert("id".to_string(), json!(id));
        let record = Record { id, fields: stored };
        self.records.entry(kind).or_default().insert(id, record.clone());
        self.log.push(Operation::Create { kind, id, fields });
        record
    }

    /// VMs and devices that currently name `address_id` as a primary address.
    fn primary_owners(&self, address_id: u64) -> Vec<(ObjectKind, u64)> {
        [ObjectKind::VirtualMachine, ObjectKind::Device]
            .into_iter()
            .flat_map(|kind| {
                self.records
                    .get(&kind)
                    .into_iter()
                    .flat_map(|records| records.values())
                    .filter(move |record| {
                        PRIMARY_FIELDS
                            .iter()
                            .any(|field| record.ref_id(field) == Some(address_id))
                    })
                    .map(move |record| (kind, record.id))
            })
            .collect()
    }

    /// The VM or device owning the interface an address is assigned to.
    fn address_owner(&self, address_id: u64) -> Option<(ObjectKind, u64)> {
        let address = self.record(ObjectKind::IpAddress, address_id)?;
        let interface_id = address.ref_id("assigned_object_id")?;
        let (interface_kind, owner_kind, owner_field) = match address.str_field("assigned_object_type")? {
            VM_INTERFACE_TYPE => (ObjectKind::VmInterface, ObjectKind::VirtualMachine, "virtual_machine"),
            DEVICE_INTERFACE_TYPE => (ObjectKind::DeviceInterface, ObjectKind::Device, "device"),
            _ => return None,
        };
        let owner_id = self.record(interface_kind, interface_id)?.ref_id(owner_field)?;
        Some((owner_kind, owner_id))
    }

    fn validate_update(&self, kind: ObjectKind, id: u64, changes: &Fields) -> Result<(), InventoryError> {
        match kind {
            ObjectKind::IpAddress
                if changes.contains_key("assigned_object_id")
                    || changes.contains_key("assigned_object_type") =>
            {
                let owners = self.primary_owners(id);
                if !owners.is_empty() {
                    return Err(InventoryError::Rejected {
                        kind,
                        reason: format!("cannot reassign address #{id} while it is primary for {owners:?}"),
                    });
                }
            }
            ObjectKind::VirtualMachine | ObjectKind::Device => {
                for field in PRIMARY_FIELDS {
                    let Some(address_id) = changes.get(field).and_then(value_id) else {
                        continue;
                    };
                    if self.address_owner(address_id) != Some((kind, id)) {
                        return Err(InventoryError::Rejected {
                            kind,
                            reason: format!("address #{address_id} is not assigned to {kind} #{id}"),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn offline(path: &str) -> InventoryError {
    InventoryError::Request {
        path: path.to_string(),
        reason: "inventory is offline".to_string(),
    }
}

fn matches(record: &Record, filter: &Filter) -> bool {
    filter
        .pairs()
        .iter()
        .all(|(key, expected)| field_matches(record, key, expected))
}

fn field_matches(record: &Record, key: &str, expected: &str) -> bool {
    if key == "id" {
        return record.id.to_string() == expected;
    }
    if let Some(value) = record.get(key) {
        let text = value_text(value);
        if key == "address" && !expected.contains('/') {
            return text.as_deref().and_then(|t| t.split('/').next()) == Some(expected);
        }
        return text.as_deref() == Some(expected);
    }
    // `cluster_id=4` matches a `cluster` reference.
    match key.strip_suffix("_id") {
        Some(base) => record.ref_id(base).map(|id| id.to_string()).as_deref() == Some(expected),
        None => false,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("value").or_else(|| map.get("id")).and_then(value_text),
        _ => None,
    }
}

#[derive(Default)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an object without logging it as a write.
    pub fn seed(&self, kind: ObjectKind, fields: Value) -> Record {
        let mut state = self.lock();
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        let record = state.insert(kind, fields);
        state.log.pop();
        record
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().log.clear();
    }

    pub fn records(&self, kind: ObjectKind) -> Vec<Record> {
        self.lock()
            .records
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn find(&self, kind: ObjectKind, filter: &Filter) -> Option<Record> {
        self.records(kind).into_iter().find(|record| matches(record, filter))
    }

    pub fn fail_on(&self, kind: ObjectKind, call: Call) {
        self.lock().failures.insert((kind, call));
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn status(&self) -> Result<Value, InventoryError> {
        if self.lock().offline {
            return Err(offline("/api/status/"));
        }
        Ok(json!({ "netbox-version": "in-memory" }))
    }

    async fn get(&self, kind: ObjectKind, filter: &Filter) -> Result<Option<Record>, InventoryError> {
        self.lock().check(kind, Call::Get)?;
        Ok(self.find(kind, filter))
    }

    async fn create(&self, kind: ObjectKind, fields: Fields) -> Result<Record, InventoryError> {
        let mut state = self.lock();
        state.check(kind, Call::Create)?;
        Ok(state.insert(kind, fields))
    }

    async fn update(&self, kind: ObjectKind, id: u64, changes: Fields) -> Result<Record, InventoryError> {
        let mut state = self.lock();
        state.check(kind, Call::Update)?;
        if state.record(kind, id).is_none() {
            return Err(InventoryError::Missing { kind, id });
        }
        state.validate_update(kind, id, &changes)?;

        let record = state
            .records
            .get_mut(&kind)
            .and_then(|records| records.get_mut(&id))
            .ok_or(InventoryError::Missing { kind, id })?;
        for (key, value) in &changes {
            record.fields.insert(key.clone(), value.clone());
        }
        let updated = record.clone();
        state.log.push(Operation::Update { kind, id, changes });
        Ok(updated)
    }
}
