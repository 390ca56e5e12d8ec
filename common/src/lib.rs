//! # infrasync common
//!
//! Types shared by every crate in the workspace:
//!
//! * **[`models`]**: records produced by a host scan and the identity of a scan target.
//! * **[`config`]**: the TOML configuration surface (hosts, credentials, cluster naming, NetBox endpoint).
//! * **[`net`]**: small address helpers used by the prober and the reconciler.

pub mod config;
pub mod models;
pub mod net;
