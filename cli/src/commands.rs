pub mod check;
pub mod run;
pub mod scan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use infrasync_common::config::{Config, ConfigError, DEFAULT_CONFIG_PATH, Endpoint};
use infrasync_core::cluster::ClusterResolver;
use infrasync_core::discovery::DiscoveryService;
use infrasync_core::inventory::Inventory;
use infrasync_core::inventory::netbox::NetboxClient;
use infrasync_core::network::FetchOptions;
use infrasync_core::network::http::ReqwestFetcher;
use infrasync_core::network::local::LocalRunner;
use infrasync_core::network::ssh::SshShell;
use infrasync_core::reconcile::{ReconcileSettings, Reconciler};
use infrasync_core::scanner::sweep::{SubnetSweeper, SweepSettings};
use infrasync_core::scanner::{ProbeSettings, RemoteProber, SignatureSettings};

const INVENTORY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "infrasync")]
#[command(about = "Discovers VMs, containers and disks over SSH and syncs them into NetBox.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file
    #[arg(long, short, global = true, env = "INFRASYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run discovery cycles forever on the configured interval
    #[command(alias = "r")]
    Run,
    /// Run a single discovery cycle and print a report
    #[command(alias = "s")]
    Scan {
        /// Reconcile against an in-memory inventory and list the writes instead
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify the NetBox endpoint and token
    #[command(alias = "c")]
    Check,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

pub fn endpoint(cfg: &Config) -> Result<Endpoint, ConfigError> {
    cfg.netbox.endpoint(|key| std::env::var(key).ok())
}

pub fn netbox(cfg: &Config) -> anyhow::Result<Arc<dyn Inventory>> {
    let client = NetboxClient::new(&endpoint(cfg)?, INVENTORY_TIMEOUT)?;
    Ok(Arc::new(client))
}

/// Wires the prober, the reconciler and, when subnets are configured, the sweep
/// for one cycle against `inventory`.
pub fn discovery_service(cfg: &Config, inventory: Arc<dyn Inventory>) -> DiscoveryService {
    let scan = &cfg.scan;

    let shell = SshShell::new(Duration::from_secs(scan.command_timeout_secs));
    let settings = ProbeSettings {
        connect_timeout: Duration::from_secs(scan.connect_timeout_secs),
        signature: SignatureSettings {
            candidates: cfg.signature.candidates.clone(),
            markers: cfg.signature.markers.clone(),
            fetch: FetchOptions {
                timeout: Duration::from_secs(scan.http_timeout_secs),
                allow_insecure_tls: cfg.signature.allow_insecure_tls,
                follow_redirects: cfg.signature.follow_redirects,
            },
        },
    };
    let prober = RemoteProber::new(Arc::new(shell), Arc::new(ReqwestFetcher), settings);

    let reconciler = Reconciler::new(
        inventory.clone(),
        ReconcileSettings {
            interface_name: scan.interface_name.clone(),
            nat_prefix: scan.nat_prefix.clone(),
            address_prefix_len: scan.address_prefix_len,
        },
    );

    let service = DiscoveryService::new(
        prober,
        reconciler,
        ClusterResolver::new(cfg.clusters.clone()),
        inventory,
    );
    if !cfg.sweep.enabled() {
        return service;
    }

    let runner = LocalRunner::new(cfg.sweep.command_prefix.clone());
    service.with_sweeper(SubnetSweeper::new(
        Arc::new(runner),
        SweepSettings {
            subnets: cfg.sweep.subnets.clone(),
            timeout: Duration::from_secs(cfg.sweep.timeout_secs),
        },
    ))
}
