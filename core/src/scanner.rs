//! # Remote Host Prober
//!
//! Collects everything one host can tell about itself over SSH: VirtualBox guests,
//! Docker containers and filesystem capacity. A separate HTTP probe checks whether
//! the host serves the monitored web service.
//!
//! A host either answers or it doesn't. Once a session is open, a failing command
//! only empties its own section of the result; it never fails the host.

use std::sync::Arc;
use std::time::Duration;

use infrasync_common::config::{Credentials, ProbeCandidate};
use infrasync_common::models::{DiskRecord, HostIdentity, HostScanResult, VmRecord};
use infrasync_protocols::{OutputFormat, ParsedOutput, docker, storage, vbox};
use tracing::{debug, info, warn};

use crate::network::{FetchOptions, HttpFetcher, RemoteShell, ShellSession};

pub mod signature;
pub mod sweep;

#[derive(Clone, Debug)]
pub struct SignatureSettings {
    pub candidates: Vec<ProbeCandidate>,
    pub markers: Vec<String>,
    pub fetch: FetchOptions,
}

#[derive(Clone, Debug)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    pub signature: SignatureSettings,
}

pub struct RemoteProber {
    shell: Arc<dyn RemoteShell>,
    http: Arc<dyn HttpFetcher>,
    settings: ProbeSettings,
}

impl RemoteProber {
    pub fn new(shell: Arc<dyn RemoteShell>, http: Arc<dyn HttpFetcher>, settings: ProbeSettings) -> Self {
        Self {
            shell,
            http,
            settings,
        }
    }

    /// Probes one host. Never fails: an unreachable host yields an empty result
    /// that still carries the outcome of the HTTP signature probe.
    pub async fn probe(&self, host: &HostIdentity, credentials: &Credentials) -> HostScanResult {
        let detected =
            signature::detect(self.http.as_ref(), &host.address, &self.settings.signature).await;
        if detected {
            info!("Service signature found on {}", host.name);
        }

        let mut session = match self
            .shell
            .connect(&host.address, credentials, self.settings.connect_timeout)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("{} is unreachable: {e}", host.name);
                return HostScanResult::unreachable(detected);
            }
        };

        let vms = collect_vms(session.as_mut()).await;
        let containers = run(session.as_mut(), docker::LIST_CONTAINERS_COMMAND, OutputFormat::ContainerListing)
            .await
            .map(ParsedOutput::into_containers)
            .unwrap_or_default();
        let disks = collect_disks(session.as_mut()).await;

        debug!(
            "{}: {} VMs, {} containers, {} filesystems",
            host.name,
            vms.len(),
            containers.len(),
            disks.len()
        );

        HostScanResult {
            reachable: true,
            vms,
            containers,
            disks,
            service_signature_detected: detected,
        }
    }
}

/// Runs `command` and parses its stdout. Failures are logged and skipped.
async fn run(session: &mut dyn ShellSession, command: &str, format: OutputFormat) -> Option<ParsedOutput> {
    match session.exec(command).await {
        Ok(output) => {
            if output.stdout.trim().is_empty() && !output.stderr.trim().is_empty() {
                debug!("{} produced only stderr: {}", format.label(), output.stderr.trim());
            }
            Some(format.parse(&output.stdout))
        }
        Err(e) => {
            debug!("{} command failed: {e}", format.label());
            None
        }
    }
}

async fn collect_vms(session: &mut dyn ShellSession) -> Vec<VmRecord> {
    let names = run(session, vbox::LIST_VMS_COMMAND, OutputFormat::VmListing)
        .await
        .map(ParsedOutput::into_vm_names)
        .unwrap_or_default();

    let mut vms = Vec::with_capacity(names.len());
    for name in names {
        let mut vm = VmRecord::new(name.as_str());

        let Some(detail) = run(session, &vbox::detail_command(&name), OutputFormat::VmDetail)
            .await
            .map(ParsedOutput::into_vm_detail)
        else {
            vms.push(vm);
            continue;
        };

        vm.memory_mib = detail.memory_mib;
        vm.vcpus = detail.vcpus;
        vm.state = detail.state;
        vm.guest_address = detail.guest_address;

        if let Some(uuid) = detail.disk_uuid.as_deref() {
            vm.disk_gib = run(session, &vbox::capacity_command(uuid), OutputFormat::DiskCapacity)
                .await
                .and_then(ParsedOutput::into_capacity_gib);
        }
        vms.push(vm);
    }
    vms
}

async fn collect_disks(session: &mut dyn ShellSession) -> Vec<DiskRecord> {
    let posix = run(session, storage::POSIX_COMMAND, OutputFormat::PosixFilesystems)
        .await
        .map(ParsedOutput::into_disks)
        .unwrap_or_default();
    if !posix.is_empty() {
        return posix;
    }

    run(session, storage::WINDOWS_COMMAND, OutputFormat::WindowsFilesystems)
        .await
        .map(ParsedOutput::into_disks)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::network::{CommandOutput, HttpResponse};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedShell {
        reachable: bool,
        outputs: HashMap<String, String>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    struct ScriptedSession {
        outputs: HashMap<String, String>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn connect(
            &self,
            address: &str,
            _credentials: &Credentials,
            _timeout: Duration,
        ) -> Result<Box<dyn ShellSession>, TransportError> {
            if !self.reachable {
                return Err(TransportError::Connect {
                    address: address.to_string(),
                    reason: "timed out".into(),
                });
            }
            Ok(Box::new(ScriptedSession {
                outputs: self.outputs.clone(),
                seen: self.seen.clone(),
            }))
        }
    }

    #[async_trait]
    impl ShellSession for ScriptedSession {
        async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
            self.seen.lock().unwrap().push(command.to_string());
            self.outputs
                .get(command)
                .map(CommandOutput::stdout)
                .ok_or_else(|| TransportError::Exec(format!("{command}: not found")))
        }
    }

    struct NoHttp;

    #[async_trait]
    impl HttpFetcher for NoHttp {
        async fn get(&self, url: &str, _options: &FetchOptions) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Http(format!("{url} refused")))
        }
    }

    fn settings() -> ProbeSettings {
        ProbeSettings {
            connect_timeout: Duration::from_secs(1),
            signature: SignatureSettings {
                candidates: vec![ProbeCandidate::new("http", 80)],
                markers: vec!["OctoPrint".into()],
                fetch: FetchOptions::default(),
            },
        }
    }

    fn prober(shell: ScriptedShell) -> RemoteProber {
        RemoteProber::new(Arc::new(shell), Arc::new(NoHttp), settings())
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "scanner".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn unreachable_host_yields_empty_result() {
        let shell = ScriptedShell {
            reachable: false,
            outputs: HashMap::new(),
            seen: Arc::default(),
        };
        let result = prober(shell)
            .probe(&HostIdentity::new("pve01", "192.168.178.10"), &credentials())
            .await;
        assert!(!result.reachable);
        assert!(!result.has_signal());
    }

    #[tokio::test]
    async fn collects_vm_with_capacity_and_address() {
        let mut outputs = HashMap::new();
        outputs.insert(
            vbox::LIST_VMS_COMMAND.to_string(),
            "\"web\" {1111-2222}\n".to_string(),
        );
        outputs.insert(
            vbox::detail_command("web"),
            "memory=2048\ncpus=2\nVMState=\"running\"\n\"SATA-ImageUUID-0-0\"=\"abcd-ef\"\nValue: 192.168.178.50\n"
                .to_string(),
        );
        outputs.insert(
            vbox::capacity_command("abcd-ef"),
            "UUID: abcd-ef\nCapacity:       20480 MBytes\n".to_string(),
        );
        outputs.insert(
            storage::POSIX_COMMAND.to_string(),
            "Filesystem Size Avail Mounted on\n/dev/sda1 100G 40G /\n".to_string(),
        );

        let shell = ScriptedShell {
            reachable: true,
            outputs,
            seen: Arc::default(),
        };
        let result = prober(shell)
            .probe(&HostIdentity::new("pve01", "192.168.178.10"), &credentials())
            .await;

        assert!(result.reachable);
        assert_eq!(result.vms.len(), 1);
        let vm = &result.vms[0];
        assert_eq!(vm.memory_mib, Some(2048));
        assert_eq!(vm.disk_gib, Some(20));
        assert_eq!(vm.guest_address.as_deref(), Some("192.168.178.50"));
        assert!(result.containers.is_empty());
        assert_eq!(result.disks.len(), 1);
    }

    #[tokio::test]
    async fn failed_detail_keeps_listed_vm() {
        let mut outputs = HashMap::new();
        outputs.insert(vbox::LIST_VMS_COMMAND.to_string(), "\"db\" {9}\n".to_string());
        let shell = ScriptedShell {
            reachable: true,
            outputs,
            seen: Arc::default(),
        };
        let result = prober(shell)
            .probe(&HostIdentity::new("pve01", "10.0.0.1"), &credentials())
            .await;
        assert_eq!(result.vms.len(), 1);
        assert_eq!(result.vms[0].name, "db");
        assert_eq!(result.vms[0].memory_mib, None);
    }

    #[tokio::test]
    async fn windows_fallback_only_without_posix_rows() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut outputs = HashMap::new();
        outputs.insert(
            storage::WINDOWS_COMMAND.to_string(),
            "Caption  FreeSpace     Size\nC:       53687091200   107374182400\n".to_string(),
        );
        let shell = ScriptedShell {
            reachable: true,
            outputs,
            seen: seen.clone(),
        };
        let result = prober(shell)
            .probe(&HostIdentity::new("win01", "10.0.0.2"), &credentials())
            .await;

        assert_eq!(result.disks.len(), 1);
        assert_eq!(result.disks[0].total_gib, 100);
        assert!(seen.lock().unwrap().iter().any(|c| c == storage::WINDOWS_COMMAND));
    }
}
