//! # Configuration
//!
//! The TOML file describing what to scan and where to reconcile it.
//!
//! ```toml
//! [netbox]
//! url = "https://netbox.lan"
//!
//! [[hosts]]
//! name = "pve01"
//! address = "192.168.178.10"
//! comment = ["Rack A", "VirtualBox host"]
//!
//! [credentials.default]
//! ssh_user = "scanner"
//! ssh_pass = "secret"
//!
//! [clusters.overrides]
//! "192.168.178.10" = "Homelab"
//!
//! [sweep]
//! subnets = ["192.168.178.0/24"]
//! command_prefix = ["sudo", "-n"]
//! ```
//!
//! Everything except the host list has a default, so a minimal file only needs
//! `[[hosts]]` and credentials.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::models::HostIdentity;

pub const DEFAULT_CONFIG_PATH: &str = "infrasync.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("NetBox endpoint is not configured (set [netbox].url/token or NETBOX_URL/NETBOX_TOKEN)")]
    MissingEndpoint,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub netbox: NetboxConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    #[serde(default)]
    pub credentials: CredentialTable,
    #[serde(default)]
    pub clusters: ClusterNaming,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml_str(&raw)?;
        debug!("Loaded {} hosts from {}", cfg.hosts.len(), path.display());
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::Invalid("no [[hosts]] configured".into()));
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() || host.address.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "every host needs a name and an address".into(),
                ));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate host name: {}",
                    host.name
                )));
            }
        }

        for subnet in &self.sweep.subnets {
            if !is_ipv4_subnet(subnet) {
                return Err(ConfigError::Invalid(format!(
                    "[sweep].subnets: {subnet} is not an IPv4 subnet like 192.168.1.0/24"
                )));
            }
        }

        if self.signature.candidates.is_empty() {
            return Err(ConfigError::Invalid(
                "[signature].candidates must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn host_identities(&self) -> Vec<HostIdentity> {
        self.hosts.iter().map(HostEntry::identity).collect()
    }
}

/// Where the inventory lives. Both values may instead come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetboxConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub token: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

impl NetboxConfig {
    /// Resolves the endpoint, falling back to `NETBOX_URL` and
    /// `NETBOX_TOKEN`/`NETBOX_API_TOKEN` through `env`.
    pub fn endpoint<F>(&self, env: F) -> Result<Endpoint, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = self
            .url
            .clone()
            .or_else(|| env("NETBOX_URL"))
            .map(|raw| clean_url(&raw))
            .filter(|url| !url.is_empty());

        let token = self
            .token
            .clone()
            .or_else(|| env("NETBOX_TOKEN"))
            .or_else(|| env("NETBOX_API_TOKEN"))
            .map(|raw| strip_quotes(&raw).to_string())
            .filter(|token| !token.is_empty());

        match (url, token) {
            (Some(url), Some(token)) => Ok(Endpoint { url, token }),
            _ => Err(ConfigError::MissingEndpoint),
        }
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

// `.env` files written by hand sometimes carry markdown-style `[url](url)` links.
fn clean_url(raw: &str) -> String {
    let unquoted = strip_quotes(raw);
    let first = unquoted.split(']').next().unwrap_or(unquoted);
    first.trim_start_matches('[').trim_end_matches('/').to_string()
}

/// Shows the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// Upper bound for a single remote command once connected.
    pub command_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Prefix length used when registering guest addresses.
    pub address_prefix_len: u8,
    /// Name of the interface created on each VM to carry its primary address.
    pub interface_name: String,
    /// Guest addresses starting with this prefix belong to the hypervisor's NAT network.
    pub nat_prefix: String,
    pub lock_file: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            connect_timeout_secs: 5,
            command_timeout_secs: 60,
            http_timeout_secs: 3,
            address_prefix_len: 24,
            interface_name: "eth0".to_string(),
            nat_prefix: "10.0.2.".to_string(),
            lock_file: PathBuf::from("/tmp/infrasync.lock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeCandidate {
    pub scheme: String,
    pub port: u16,
}

impl ProbeCandidate {
    pub fn new(scheme: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_string(),
            port,
        }
    }

    /// URL of this candidate on `address`. A port already present in the host
    /// address is the SSH port and is replaced by the candidate's.
    pub fn url_for(&self, address: &str) -> String {
        let host = crate::net::host_only(address);
        if host.parse::<std::net::Ipv6Addr>().is_ok() {
            format!("{}://[{}]:{}/", self.scheme, host, self.port)
        } else {
            format!("{}://{}:{}/", self.scheme, host, self.port)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Tried in order; the first match wins.
    pub candidates: Vec<ProbeCandidate>,
    pub markers: Vec<String>,
    pub allow_insecure_tls: bool,
    pub follow_redirects: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                ProbeCandidate::new("http", 80),
                ProbeCandidate::new("https", 443),
                ProbeCandidate::new("http", 5000),
            ],
            markers: vec!["OctoPrint".to_string(), "octoprint".to_string()],
            allow_insecure_tls: true,
            follow_redirects: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default)]
    pub comment: Option<Comment>,
}

impl HostEntry {
    pub fn identity(&self) -> HostIdentity {
        HostIdentity {
            name: self.name.clone(),
            address: self.address.clone(),
            comment: self.comment.as_ref().map(Comment::render),
        }
    }
}

/// A host comment: either one string or a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Comment {
    Text(String),
    Lines(Vec<String>),
}

impl Comment {
    pub fn render(&self) -> String {
        match self {
            Comment::Text(text) => text.clone(),
            Comment::Lines(lines) => lines.join("\n"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialEntry {
    pub ssh_user: Option<String>,
    pub ssh_pass: Option<String>,
}

/// Default SSH credentials plus per-host overrides, keyed by host name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialTable {
    #[serde(default)]
    pub default: CredentialEntry,
    #[serde(default)]
    pub overrides: HashMap<String, CredentialEntry>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

impl CredentialTable {
    /// Resolves credentials field by field: an override may replace only the password.
    pub fn resolve(&self, host_name: &str) -> Option<Credentials> {
        let overrides = self.overrides.get(host_name);

        let username = overrides
            .and_then(|entry| entry.ssh_user.clone())
            .or_else(|| self.default.ssh_user.clone())?;
        let password = overrides
            .and_then(|entry| entry.ssh_pass.clone())
            .or_else(|| self.default.ssh_pass.clone())?;

        Some(Credentials { username, password })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterNaming {
    pub vm_prefix: String,
    pub container_prefix: String,
    /// Host address -> VM cluster name, used verbatim. The host's container
    /// cluster is the same name behind `container_prefix`.
    pub overrides: HashMap<String, String>,
}

impl Default for ClusterNaming {
    fn default() -> Self {
        Self {
            vm_prefix: "Cluster-".to_string(),
            container_prefix: "Docker-".to_string(),
            overrides: HashMap::new(),
        }
    }
}

/// Local ARP sweep of directly attached subnets. Disabled while `subnets` is empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub subnets: Vec<String>,
    /// Prepended to the `nmap` invocation, e.g. `["sudo", "-n"]`. ARP sweeps need
    /// raw sockets and the process itself never runs as root.
    pub command_prefix: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            command_prefix: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl SweepConfig {
    pub fn enabled(&self) -> bool {
        !self.subnets.is_empty()
    }
}

fn is_ipv4_subnet(raw: &str) -> bool {
    let Some((network, prefix_len)) = raw.split_once('/') else {
        return false;
    };
    network.parse::<std::net::Ipv4Addr>().is_ok() && prefix_len.parse::<u8>().is_ok_and(|len| len <= 32)
}
