use std::time::Duration;

use colored::*;
use infrasync_common::models::HostScanResult;
use infrasync_core::discovery::{CycleReport, HostReport};
use infrasync_core::inventory::memory::Operation;
use infrasync_core::reconcile::{ReconcileSummary, SweepReport};
use tracing::info;

use super::colors;

pub const PRINT_TARGET: &str = "infrasync::print";
pub const TOTAL_WIDTH: usize = 64;
const KEY_WIDTH: usize = 10;

pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, "{msg}");
}

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    print(&format!("{}", line));
}

pub fn fat_separator() {
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH).color(colors::SEPARATOR);
    print(&format!("{}", sep));
}

pub fn centerln(msg: &str) {
    print(&centered(msg));
}

fn centered(msg: &str) -> String {
    let space = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    format!("{}{}", space, msg)
}

pub fn tree_head(idx: usize, name: &str) {
    let idx_str: String = format!("[{}]", idx.to_string().color(colors::ACCENT));
    let output: String = format!(
        "{} {}",
        idx_str.color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    );
    print(&output);
}

pub fn as_tree_one_level(key_value_pair: Vec<(String, ColoredString)>) {
    for (i, (key, value)) in key_value_pair.iter().enumerate() {
        let last: bool = i + 1 == key_value_pair.len();
        let branch: ColoredString = if !last {
            "├─".bright_black()
        } else {
            "└─".bright_black()
        };
        let dots = ".".repeat(KEY_WIDTH.saturating_sub(key.len()));
        let output: String = format!(
            " {} {}{}{} {}",
            branch,
            key.color(colors::TEXT_DEFAULT),
            dots.color(colors::SEPARATOR),
            ":".color(colors::SEPARATOR),
            value
        );
        print(&output);
    }
}

pub fn report(report: &CycleReport, total_time: Duration) {
    header("discovery report");
    for (idx, (name, host)) in report.hosts.iter().enumerate() {
        tree_head(idx, name);
        as_tree_one_level(host_details(host));
        if idx + 1 != report.hosts.len() {
            print("");
        }
    }

    if let Some(sweep) = &report.sweep {
        header("subnet sweep");
        as_tree_one_level(sweep_details(sweep));
    }

    let reachable: ColoredString = format!("{}/{} hosts reachable", report.reachable_count(), report.hosts.len())
        .bold()
        .green();
    let totals: ColoredString = report.totals().to_string().normal();
    let elapsed: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();

    fat_separator();
    centerln(&format!("{reachable} in {elapsed}"));
    centerln(&format!("{totals}"));
}

fn host_details(host: &HostReport) -> Vec<(String, ColoredString)> {
    let result: &HostScanResult = &host.result;
    let mut details = vec![(
        "Shell".to_string(),
        if result.reachable {
            "reachable".green()
        } else {
            "unreachable".red()
        },
    )];

    if result.reachable {
        details.push(("VMs".to_string(), result.vms.len().to_string().normal()));
        details.push(("Containers".to_string(), result.containers.len().to_string().normal()));
        details.push(("Disks".to_string(), result.disks.len().to_string().normal()));
    }

    details.push((
        "OctoPrint".to_string(),
        if result.service_signature_detected {
            "detected".green()
        } else {
            "no".bright_black()
        },
    ));

    details.push(("Sync".to_string(), summary_value(host.summary.as_ref())));
    details
}

fn summary_value(summary: Option<&ReconcileSummary>) -> ColoredString {
    match summary {
        None => "skipped".bright_black(),
        Some(s) if s.failed > 0 => s.to_string().yellow(),
        Some(s) => s.to_string().normal(),
    }
}

fn sweep_details(sweep: &SweepReport) -> Vec<(String, ColoredString)> {
    let mut details = vec![
        ("Neighbors".to_string(), sweep.neighbors.to_string().normal()),
        ("Sync".to_string(), summary_value(Some(&sweep.summary))),
    ];
    for neighbor in &sweep.unregistered {
        details.push((
            neighbor.address.to_string(),
            format!("{} unregistered", neighbor.mac).yellow(),
        ));
    }
    details
}

/// Lists the writes a dry run would have sent to the inventory.
pub fn planned_writes(operations: &[Operation]) {
    header("planned writes");
    if operations.is_empty() {
        print(&format!("{}", "Inventory is already up to date".color(colors::TEXT_DEFAULT)));
        return;
    }

    for op in operations {
        let line = match op {
            Operation::Create { kind, fields, .. } => {
                let label = fields
                    .get("name")
                    .or_else(|| fields.get("address"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                format!("{} {kind} {}", "create".green(), label.color(colors::PRIMARY))
            }
            Operation::Update { kind, id, changes } => {
                let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
                format!(
                    "{} {kind} #{id} {}",
                    "update".yellow(),
                    keys.join(", ").color(colors::SECONDARY)
                )
            }
        };
        print(&format!("{} {}", ">".color(colors::SEPARATOR), line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centering_ignores_color_codes() {
        colored::control::set_override(true);
        let plain = centered("infrasync");
        let painted = centered(&"infrasync".green().to_string());
        let indent = |line: &str| line.len() - line.trim_start().len();
        assert_eq!(indent(&plain), (TOTAL_WIDTH - 9) / 2);
        assert_eq!(indent(&painted), indent(&plain));
    }

    #[test]
    fn unreachable_host_hides_collection_counts() {
        let host = HostReport {
            result: HostScanResult::unreachable(true),
            summary: None,
        };
        let keys: Vec<String> = host_details(&host).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Shell", "OctoPrint", "Sync"]);
    }

    #[test]
    fn sweep_lists_each_unregistered_neighbor() {
        let sweep = SweepReport {
            neighbors: 3,
            unregistered: vec![infrasync_common::models::NeighborRecord {
                address: "192.168.178.99".parse().unwrap(),
                mac: "AA:BB:CC:DD:EE:99".into(),
            }],
            summary: ReconcileSummary::default(),
        };
        let keys: Vec<String> = sweep_details(&sweep).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Neighbors", "Sync", "192.168.178.99"]);
    }
}
