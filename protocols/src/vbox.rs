//! VirtualBox (`vboxmanage`) output.
//!
//! `vboxmanage` has no bulk detail query, so the prober lists the VMs first and then
//! asks for each one. The detail command also reads the guest's first IPv4 address
//! through guest properties so one round trip covers both.

const INACCESSIBLE_MARKER: &str = "<inaccessible>";
const GUEST_IPV4_PROPERTY: &str = "/VirtualBox/GuestInfo/Net/0/V4/IP";
const CAPACITY_LABEL: &str = "Capacity:";
const NO_DISK: &str = "none";

pub const LIST_VMS_COMMAND: &str = "vboxmanage list vms";

pub fn detail_command(vm_name: &str) -> String {
    let vm = shell_words::quote(vm_name);
    format!(
        "vboxmanage showvminfo {vm} --machinereadable; \
         vboxmanage guestproperty get {vm} {GUEST_IPV4_PROPERTY}"
    )
}

pub fn capacity_command(disk_uuid: &str) -> String {
    format!("vboxmanage showmediuminfo disk {}", shell_words::quote(disk_uuid))
}

/// What the detail command reveals about one VM.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VmDetail {
    pub memory_mib: Option<u64>,
    pub vcpus: Option<f64>,
    /// UUID of the first attached disk image. `None` when nothing is attached.
    pub disk_uuid: Option<String>,
    pub state: Option<String>,
    pub guest_address: Option<String>,
}

/// Extracts VM names from `vboxmanage list vms`.
///
/// ```text
/// "ubuntu-server" {0b8d2a9c-...}
/// "<inaccessible>" {5c1e...}
/// ```
pub fn parse_vm_list(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.contains(INACCESSIBLE_MARKER))
        .filter_map(first_quoted)
        .map(str::to_string)
        .collect()
}

fn first_quoted(line: &str) -> Option<&str> {
    let mut parts = line.split('"');
    parts.next()?;
    let name = parts.next()?;
    // A lone quote has no closing partner.
    parts.next()?;
    if name.is_empty() { None } else { Some(name) }
}

/// Parses `showvminfo --machinereadable` output followed by a `guestproperty get` answer.
pub fn parse_vm_detail(raw: &str) -> VmDetail {
    let mut detail = VmDetail::default();

    for line in raw.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Value:") {
            detail.guest_address = Some(value.trim().to_string());
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = unquote(key);
        let value = unquote(value);

        match key {
            "memory" => detail.memory_mib = value.parse().ok(),
            "cpus" => detail.vcpus = value.parse().ok(),
            "VMState" => detail.state = Some(value.to_string()),
            _ if key.contains("ImageUUID") => {
                if detail.disk_uuid.is_none() && !value.is_empty() && value != NO_DISK {
                    detail.disk_uuid = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    detail
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

/// Reads `Capacity: 20480 MBytes` from `showmediuminfo` and converts it to GiB.
pub fn parse_capacity_gib(raw: &str) -> Option<u64> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(CAPACITY_LABEL))?;
    let (_, rest) = line.split_once(':')?;
    let mebibytes: u64 = rest.split_whitespace().next()?.parse().ok()?;
    Some(mebibytes / 1024)
}
