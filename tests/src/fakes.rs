use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use infrasync_common::config::{ClusterNaming, Credentials, ProbeCandidate};
use infrasync_core::cluster::ClusterResolver;
use infrasync_core::discovery::{CredentialSource, DiscoveryService};
use infrasync_core::error::TransportError;
use infrasync_core::inventory::Inventory;
use infrasync_core::network::{
    CommandOutput, CommandRunner, FetchOptions, HttpFetcher, HttpResponse, RemoteShell, ShellSession,
};
use infrasync_core::reconcile::{ReconcileSettings, Reconciler};
use infrasync_core::scanner::{ProbeSettings, RemoteProber, SignatureSettings};
use infrasync_protocols::{docker, storage, vbox};

/// Scripted command output for one host.
#[derive(Clone, Default)]
pub struct HostScript {
    outputs: HashMap<String, String>,
}

impl HostScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, command: impl Into<String>, output: &str) -> Self {
        self.outputs.insert(command.into(), output.to_string());
        self
    }

    /// A VirtualBox host running the given `(name, address)` guests.
    pub fn with_vms(mut self, vms: &[(&str, Option<&str>)]) -> Self {
        let listing: String = vms
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("\"{name}\" {{00000000-0000-0000-0000-00000000000{i}}}\n"))
            .collect();
        self = self.on(vbox::LIST_VMS_COMMAND, &listing);

        for (name, address) in vms {
            let mut detail = format!("name=\"{name}\"\nmemory=2048\ncpus=2\nVMState=\"running\"\n");
            match address {
                Some(address) => detail.push_str(&format!("Value: {address}\n")),
                None => detail.push_str("No value set!\n"),
            }
            self = self.on(vbox::detail_command(name), &detail);
        }
        self
    }

    pub fn with_containers(self, json_lines: &str) -> Self {
        self.on(docker::LIST_CONTAINERS_COMMAND, json_lines)
    }

    pub fn with_disks(self, df_output: &str) -> Self {
        self.on(storage::POSIX_COMMAND, df_output)
    }
}

/// Remote shell keyed by address. Addresses without a script refuse connections.
#[derive(Clone, Default)]
pub struct FakeShell {
    hosts: Arc<Mutex<HashMap<String, HostScript>>>,
    log: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeShell {
    pub fn host(&self, address: &str, script: HostScript) {
        self.hosts.lock().unwrap().insert(address.to_string(), script);
    }

    pub fn commands_for(&self, address: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

struct FakeSession {
    address: String,
    script: HostScript,
    log: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn connect(
        &self,
        address: &str,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn ShellSession>, TransportError> {
        let script = self.hosts.lock().unwrap().get(address).cloned();
        match script {
            Some(script) => Ok(Box::new(FakeSession {
                address: address.to_string(),
                script,
                log: self.log.clone(),
            })),
            None => Err(TransportError::Connect {
                address: address.to_string(),
                reason: "connection timed out".into(),
            }),
        }
    }
}

#[async_trait]
impl ShellSession for FakeSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        self.log
            .lock()
            .unwrap()
            .push((self.address.clone(), command.to_string()));
        match self.script.outputs.get(command) {
            Some(output) => Ok(CommandOutput::stdout(output.as_str())),
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: "command not found".into(),
                exit_status: Some(127),
            }),
        }
    }
}

/// HTTP fetcher serving fixed pages by URL.
#[derive(Clone, Default)]
pub struct FakeHttp {
    pages: Arc<Mutex<HashMap<String, HttpResponse>>>,
}

impl FakeHttp {
    pub fn page(&self, url: &str, status: u16, body: &str) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
    }
}

#[async_trait]
impl HttpFetcher for FakeHttp {
    async fn get(&self, url: &str, _options: &FetchOptions) -> Result<HttpResponse, TransportError> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Http(format!("{url}: connection refused")))
    }
}

/// Same credentials for every host, optionally missing for some.
pub struct StaticCredentials {
    pub missing: Vec<String>,
}

impl CredentialSource for StaticCredentials {
    fn credentials_for(&self, host_name: &str) -> Option<Credentials> {
        if self.missing.iter().any(|m| m == host_name) {
            return None;
        }
        Some(Credentials {
            username: "scanner".into(),
            password: "secret".into(),
        })
    }
}

pub fn everyone() -> StaticCredentials {
    StaticCredentials { missing: Vec::new() }
}

pub fn service(
    shell: &FakeShell,
    http: &FakeHttp,
    inventory: Arc<dyn Inventory>,
    naming: ClusterNaming,
) -> DiscoveryService {
    let prober = RemoteProber::new(
        Arc::new(shell.clone()),
        Arc::new(http.clone()),
        ProbeSettings {
            connect_timeout: Duration::from_secs(5),
            signature: SignatureSettings {
                candidates: vec![
                    ProbeCandidate::new("http", 80),
                    ProbeCandidate::new("https", 443),
                    ProbeCandidate::new("http", 5000),
                ],
                markers: vec!["OctoPrint".into(), "octoprint".into()],
                fetch: FetchOptions::default(),
            },
        },
    );
    let reconciler = Reconciler::new(
        inventory.clone(),
        ReconcileSettings {
            interface_name: "eth0".into(),
            nat_prefix: "10.0.2.".into(),
            address_prefix_len: 24,
        },
    );
    DiscoveryService::new(prober, reconciler, ClusterResolver::new(naming), inventory)
}

/// Local runner answering every sweep with the same `nmap` output.
#[derive(Clone, Default)]
pub struct FakeRunner {
    output: Arc<Mutex<String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRunner {
    pub fn answer(&self, nmap_output: &str) {
        *self.output.lock().unwrap() = nmap_output.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<CommandOutput, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{program} {}", args.join(" ")));
        Ok(CommandOutput::stdout(self.output.lock().unwrap().clone()))
    }
}
