//! Discovery and reconciliation core.
//!
//! * [`scanner`]: probes one host over SSH and HTTP.
//! * [`cluster`]: names the clusters a host's guests belong to.
//! * [`reconcile`]: writes a scan result into the inventory.
//! * [`discovery`]: runs both over every configured host.

pub mod cluster;
pub mod discovery;
pub mod error;
pub mod inventory;
pub mod network;
pub mod reconcile;
pub mod scanner;
