//! Filesystem usage, POSIX first with a Windows fallback.
//!
//! `df` is asked for GiB directly, so its sizes carry a `G` suffix. `wmic` only
//! reports raw bytes. A host that produced no `df` rows is assumed to be Windows.

use infrasync_common::models::DiskRecord;

pub const POSIX_COMMAND: &str =
    "df -BG --output=source,size,avail,target -x tmpfs -x devtmpfs -x squashfs -x overlay";
pub const WINDOWS_COMMAND: &str = "wmic logicaldisk get Caption,FreeSpace,Size";

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Parses `df -BG --output=source,size,avail,target`.
///
/// ```text
/// Filesystem     1G-blocks  Avail Mounted on
/// /dev/sda1            50G    20G /
/// ```
pub fn parse_posix(raw: &str) -> Vec<DiskRecord> {
    raw.lines().filter_map(parse_posix_row).collect()
}

fn parse_posix_row(line: &str) -> Option<DiskRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    Some(DiskRecord {
        device: tokens[0].to_string(),
        total_gib: parse_suffixed_gib(tokens[1])?,
        free_gib: parse_suffixed_gib(tokens[2])?,
        // Mount points may contain spaces.
        mount_point: tokens[3..].join(" "),
    })
}

fn parse_suffixed_gib(token: &str) -> Option<u64> {
    token.trim_end_matches('G').parse().ok()
}

/// Parses `wmic logicaldisk get Caption,FreeSpace,Size`.
///
/// ```text
/// Caption  FreeSpace     Size
/// C:       64424509440   255953203200
/// D:
/// ```
///
/// Drives without media report no sizes and are skipped.
pub fn parse_windows(raw: &str) -> Vec<DiskRecord> {
    raw.lines().filter_map(parse_windows_row).collect()
}

fn parse_windows_row(line: &str) -> Option<DiskRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [caption, free, size] = tokens.as_slice() else {
        return None;
    };

    let free_bytes: u64 = free.parse().ok()?;
    let size_bytes: u64 = size.parse().ok()?;

    Some(DiskRecord {
        device: caption.to_string(),
        total_gib: size_bytes / BYTES_PER_GIB,
        free_gib: free_bytes / BYTES_PER_GIB,
        mount_point: caption.to_string(),
    })
}
