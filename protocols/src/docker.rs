//! Docker container listing.

use std::collections::BTreeSet;

use infrasync_common::models::ContainerRecord;
use serde::Deserialize;
use tracing::debug;

pub const LIST_CONTAINERS_COMMAND: &str = "docker ps -a --format '{{json .}}'";

const MAPPING_ARROW: &str = "->";

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "State", default)]
    state: Option<String>,
}

impl From<PsLine> for ContainerRecord {
    fn from(line: PsLine) -> Self {
        ContainerRecord {
            name: line.names,
            image: line.image,
            created_at: line.created_at,
            raw_port_mapping: line.ports,
            state: line.state,
        }
    }
}

/// Decodes `docker ps --format '{{json .}}'`, one object per line.
pub fn parse_container_list(raw: &str) -> Vec<ContainerRecord> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<PsLine>(line) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("Skipping undecodable container line: {e}");
                None
            }
        })
        .filter(|parsed| !parsed.names.is_empty())
        .map(ContainerRecord::from)
        .collect()
}

/// Reduces a raw `Ports` column to the published host ports.
///
/// `"0.0.0.0:8080->80/tcp, :::8080->80/tcp, 5432/tcp"` becomes `"8080"`: only
/// published mappings count, duplicates across protocols and address families
/// collapse, and the result is sorted ascending.
pub fn format_ports(raw: &str) -> String {
    let ports: BTreeSet<u16> = raw
        .split(',')
        .filter_map(|entry| entry.split_once(MAPPING_ARROW))
        .filter_map(|(host_side, _)| host_side.trim().rsplit(':').next())
        .filter_map(|port| port.parse::<u16>().ok())
        .collect();

    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<String>>()
        .join(", ")
}
