//! # Command Output Protocols
//!
//! The remote hosts answer in several loosely structured text formats. Each one gets
//! its own module with the exact command string that produces it and a pure parser
//! for its output:
//!
//! * [`vbox`]: VirtualBox listing, per-VM detail and medium capacity.
//! * [`docker`]: container listing (one JSON object per line) and port mappings.
//! * [`storage`]: filesystem usage in POSIX `df` and Windows `wmic` form.
//! * [`nmap`]: neighbors found by a local ARP sweep.
//!
//! [`OutputFormat`] ties them together so callers can treat "run a command, parse
//! what came back" uniformly. Parsers never fail as a whole: a malformed line is
//! skipped and the rest of the output is still used.

use infrasync_common::models::{ContainerRecord, DiskRecord, NeighborRecord};

pub mod docker;
pub mod nmap;
pub mod storage;
pub mod vbox;

use vbox::VmDetail;

/// One variant per known command output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    VmListing,
    VmDetail,
    DiskCapacity,
    ContainerListing,
    PosixFilesystems,
    WindowsFilesystems,
    NeighborSweep,
}

/// The typed result of parsing one command's output.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedOutput {
    VmNames(Vec<String>),
    VmDetail(VmDetail),
    DiskCapacity(Option<u64>),
    Containers(Vec<ContainerRecord>),
    Disks(Vec<DiskRecord>),
    Neighbors(Vec<NeighborRecord>),
}

impl OutputFormat {
    pub fn parse(self, raw: &str) -> ParsedOutput {
        match self {
            OutputFormat::VmListing => ParsedOutput::VmNames(vbox::parse_vm_list(raw)),
            OutputFormat::VmDetail => ParsedOutput::VmDetail(vbox::parse_vm_detail(raw)),
            OutputFormat::DiskCapacity => ParsedOutput::DiskCapacity(vbox::parse_capacity_gib(raw)),
            OutputFormat::ContainerListing => {
                ParsedOutput::Containers(docker::parse_container_list(raw))
            }
            OutputFormat::PosixFilesystems => ParsedOutput::Disks(storage::parse_posix(raw)),
            OutputFormat::WindowsFilesystems => ParsedOutput::Disks(storage::parse_windows(raw)),
            OutputFormat::NeighborSweep => ParsedOutput::Neighbors(nmap::parse_sweep(raw)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::VmListing => "vm listing",
            OutputFormat::VmDetail => "vm detail",
            OutputFormat::DiskCapacity => "disk capacity",
            OutputFormat::ContainerListing => "container listing",
            OutputFormat::PosixFilesystems => "filesystem usage",
            OutputFormat::WindowsFilesystems => "logical disks",
            OutputFormat::NeighborSweep => "neighbor sweep",
        }
    }
}

impl ParsedOutput {
    pub fn into_vm_names(self) -> Vec<String> {
        match self {
            ParsedOutput::VmNames(names) => names,
            _ => Vec::new(),
        }
    }

    pub fn into_vm_detail(self) -> VmDetail {
        match self {
            ParsedOutput::VmDetail(detail) => detail,
            _ => VmDetail::default(),
        }
    }

    pub fn into_capacity_gib(self) -> Option<u64> {
        match self {
            ParsedOutput::DiskCapacity(gib) => gib,
            _ => None,
        }
    }

    pub fn into_containers(self) -> Vec<ContainerRecord> {
        match self {
            ParsedOutput::Containers(containers) => containers,
            _ => Vec::new(),
        }
    }

    pub fn into_disks(self) -> Vec<DiskRecord> {
        match self {
            ParsedOutput::Disks(disks) => disks,
            _ => Vec::new(),
        }
    }

    pub fn into_neighbors(self) -> Vec<NeighborRecord> {
        match self {
            ParsedOutput::Neighbors(neighbors) => neighbors,
            _ => Vec::new(),
        }
    }
}
