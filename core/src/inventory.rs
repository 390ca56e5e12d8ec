//! # Inventory Port
//!
//! The reconciler talks to the inventory exclusively through [`Inventory`]: look an
//! object up by exact-match filter, create it, or patch some of its fields. Objects
//! travel as loosely typed JSON [`Record`]s because the inventory owns their schema;
//! the reconciler only reads the handful of fields it manages.
//!
//! * [`netbox`]: the REST client used in production.
//! * [`memory`]: an in-process inventory with an operation log, used for dry runs
//!   and tests.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::InventoryError;

pub mod memory;
pub mod netbox;

pub type Fields = Map<String, Value>;

/// Object classes the reconciler reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    ClusterType,
    Cluster,
    Device,
    VirtualMachine,
    VmInterface,
    DeviceInterface,
    IpAddress,
    CustomField,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::ClusterType => "cluster type",
            ObjectKind::Cluster => "cluster",
            ObjectKind::Device => "device",
            ObjectKind::VirtualMachine => "virtual machine",
            ObjectKind::VmInterface => "VM interface",
            ObjectKind::DeviceInterface => "device interface",
            ObjectKind::IpAddress => "ip address",
            ObjectKind::CustomField => "custom field",
        };
        f.write_str(name)
    }
}

/// Exact-match lookup criteria, in query-string form (`name=web`, `cluster_id=4`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pairs: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        f.write_str(&rendered.join("&"))
    }
}

/// One inventory object.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: u64,
    pub fields: Fields,
}

impl Record {
    /// Builds a record from a JSON object carrying a numeric `id`.
    pub fn from_json(value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let id = fields.get("id")?.as_u64()?;
        Some(Self { id, fields })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Reads a reference to another object, given either as a bare id or as a
    /// nested object with an `id`.
    pub fn ref_id(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(value_id)
    }

    pub fn custom_fields(&self) -> Fields {
        match self.get("custom_fields") {
            Some(Value::Object(map)) => map.clone(),
            _ => Fields::new(),
        }
    }
}

pub(crate) fn value_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::Object(map) => map.get("id").and_then(Value::as_u64),
        _ => None,
    }
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// The inventory's status document; doubles as a connectivity check.
    async fn status(&self) -> Result<Value, InventoryError>;

    /// First object of `kind` matching every pair in `filter`.
    async fn get(&self, kind: ObjectKind, filter: &Filter) -> Result<Option<Record>, InventoryError>;

    async fn create(&self, kind: ObjectKind, fields: Fields) -> Result<Record, InventoryError>;

    /// Patches only the given fields and returns the updated object.
    async fn update(&self, kind: ObjectKind, id: u64, changes: Fields) -> Result<Record, InventoryError>;
}
