use std::collections::HashMap;
use std::sync::Arc;

use infrasync_common::config::ClusterNaming;
use infrasync_common::models::HostIdentity;
use infrasync_core::error::CycleError;
use infrasync_core::inventory::memory::{MemoryInventory, Operation};
use infrasync_core::inventory::{Filter, ObjectKind};
use infrasync_core::scanner::sweep::{SubnetSweeper, SweepSettings};
use infrasync_protocols::vbox;
use serde_json::{Value, json};

use crate::fakes::{FakeHttp, FakeRunner, FakeShell, HostScript, StaticCredentials, everyone, service};

const HOST_A: &str = "192.168.178.10";
const HOST_B: &str = "192.168.178.20";

fn hosts() -> Vec<HostIdentity> {
    vec![
        HostIdentity::new("alpha", HOST_A),
        HostIdentity::new("bravo", HOST_B).with_comment("Basement rack"),
    ]
}

struct Harness {
    shell: FakeShell,
    http: FakeHttp,
    inventory: Arc<MemoryInventory>,
}

impl Harness {
    fn new() -> Self {
        Self {
            shell: FakeShell::default(),
            http: FakeHttp::default(),
            inventory: Arc::new(MemoryInventory::new()),
        }
    }

    fn service(&self) -> infrasync_core::discovery::DiscoveryService {
        service(
            &self.shell,
            &self.http,
            self.inventory.clone(),
            ClusterNaming::default(),
        )
    }

    fn vm(&self, name: &str) -> Option<infrasync_core::inventory::Record> {
        self.inventory
            .find(ObjectKind::VirtualMachine, &Filter::new().eq("name", name))
    }
}

#[tokio::test]
async fn unreachable_host_does_not_stop_the_cycle() {
    let harness = Harness::new();
    harness
        .shell
        .host(HOST_B, HostScript::new().with_vms(&[("web", Some("192.168.178.50"))]));

    let report = harness
        .service()
        .run_cycle(&hosts(), &everyone())
        .await
        .expect("cycle should complete");

    let alpha = &report.hosts["alpha"];
    assert!(!alpha.result.reachable);
    assert!(alpha.summary.is_none(), "nothing to reconcile for alpha");

    let bravo = &report.hosts["bravo"];
    assert!(bravo.result.reachable);
    assert_eq!(bravo.result.vms.len(), 1);

    let vm = harness.vm("web").expect("web was created");
    let cluster = harness
        .inventory
        .find(ObjectKind::Cluster, &Filter::new().eq("name", "Cluster-bravo"))
        .expect("cluster created for bravo");
    assert_eq!(vm.ref_id("cluster"), Some(cluster.id));
    assert_eq!(cluster.str_field("comments"), Some("Basement rack"));
    assert!(
        harness
            .inventory
            .find(ObjectKind::Cluster, &Filter::new().eq("name", "Cluster-alpha"))
            .is_none()
    );
}

#[tokio::test]
async fn second_cycle_with_same_results_writes_nothing() {
    let harness = Harness::new();
    harness.shell.host(
        HOST_B,
        HostScript::new()
            .with_vms(&[("web", Some("192.168.178.50")), ("db", None)])
            .with_containers(
                r#"{"Names":"grafana","Image":"grafana/grafana:11","CreatedAt":"2024-05-01","Ports":"0.0.0.0:3000->3000/tcp","State":"running"}"#,
            ),
    );
    let service = harness.service();

    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    let vm_creates = harness
        .inventory
        .operations()
        .iter()
        .filter(|op| op.is_create() && op.kind() == ObjectKind::VirtualMachine)
        .count();
    assert_eq!(vm_creates, 3);

    harness.inventory.clear_operations();
    let report = service.run_cycle(&hosts(), &everyone()).await.unwrap();

    assert_eq!(harness.inventory.operations(), Vec::<Operation>::new());
    assert_eq!(report.totals().created + report.totals().updated, 0);
}

#[tokio::test]
async fn moved_address_is_detached_before_promotion() {
    let harness = Harness::new();
    let service = harness.service();

    harness
        .shell
        .host(HOST_B, HostScript::new().with_vms(&[("old", Some("192.168.178.77"))]));
    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    let old = harness.vm("old").unwrap();
    assert!(old.ref_id("primary_ip4").is_some());

    harness.inventory.clear_operations();
    harness.shell.host(
        HOST_B,
        HostScript::new().with_vms(&[("old", None), ("new", Some("192.168.178.77"))]),
    );
    service.run_cycle(&hosts(), &everyone()).await.unwrap();

    let new = harness.vm("new").unwrap();
    let ops = harness.inventory.operations();
    let cleared = ops.iter().position(|op| {
        matches!(op, Operation::Update { kind: ObjectKind::VirtualMachine, id, changes }
            if *id == old.id && changes.get("primary_ip4") == Some(&Value::Null))
    });
    let rebound = ops.iter().position(|op| {
        matches!(op, Operation::Update { kind: ObjectKind::IpAddress, changes, .. }
            if changes.contains_key("assigned_object_id"))
    });
    let promoted = ops.iter().position(|op| {
        matches!(op, Operation::Update { kind: ObjectKind::VirtualMachine, id, changes }
            if *id == new.id && changes.contains_key("primary_ip4"))
    });

    let (cleared, rebound, promoted) = (cleared.unwrap(), rebound.unwrap(), promoted.unwrap());
    assert!(cleared < rebound && rebound < promoted, "{ops:#?}");

    let address = harness
        .inventory
        .find(ObjectKind::IpAddress, &Filter::new().eq("address", "192.168.178.77/24"))
        .unwrap();
    assert_eq!(harness.vm("new").unwrap().ref_id("primary_ip4"), Some(address.id));
    assert_eq!(harness.vm("old").unwrap().ref_id("primary_ip4"), None);
    assert_eq!(harness.inventory.records(ObjectKind::IpAddress).len(), 1);
}

#[tokio::test]
async fn nat_addresses_never_become_primary() {
    let harness = Harness::new();
    harness
        .shell
        .host(HOST_B, HostScript::new().with_vms(&[("isolated", Some("10.0.2.15"))]));

    harness
        .service()
        .run_cycle(&hosts(), &everyone())
        .await
        .unwrap();

    assert!(harness.vm("isolated").is_some());
    assert!(harness.inventory.records(ObjectKind::IpAddress).is_empty());
    let submitted = harness.inventory.operations().into_iter().any(|op| match op {
        Operation::Create { fields, .. } => fields.get("address") == Some(&json!("10.0.2.15/24")),
        _ => false,
    });
    assert!(!submitted);
}

#[tokio::test]
async fn signature_alone_is_enough_to_reconcile() {
    let harness = Harness::new();
    harness.inventory.seed(ObjectKind::Device, json!({"name": "alpha"}));
    harness
        .http
        .page("http://192.168.178.10:5000/", 200, "<title>OctoPrint Login</title>");

    let report = harness
        .service()
        .run_cycle(&hosts(), &everyone())
        .await
        .unwrap();

    let alpha = &report.hosts["alpha"];
    assert!(!alpha.result.reachable);
    assert!(alpha.result.service_signature_detected);
    assert!(alpha.summary.is_some());

    let device = harness
        .inventory
        .find(ObjectKind::Device, &Filter::new().eq("name", "alpha"))
        .unwrap();
    assert_eq!(device.custom_fields().get("octoprint"), Some(&json!(true)));
}

#[tokio::test]
async fn disk_summary_is_written_once() {
    let harness = Harness::new();
    harness.inventory.seed(ObjectKind::Device, json!({"name": "bravo"}));
    harness.shell.host(
        HOST_B,
        HostScript::new().with_disks(
            "Filesystem     1G-blocks  Avail Mounted on\n\
             /dev/sda1            50G    20G /\n\
             /dev/sdb1           916G   400G /srv/media\n",
        ),
    );
    let service = harness.service();

    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    let device = harness
        .inventory
        .find(ObjectKind::Device, &Filter::new().eq("name", "bravo"))
        .unwrap();
    assert_eq!(
        device.str_field("comments"),
        Some("Storage:\n/ (/dev/sda1): 20 GiB free of 50 GiB\n/srv/media (/dev/sdb1): 400 GiB free of 916 GiB")
    );
    assert!(
        harness
            .shell
            .commands_for(HOST_B)
            .iter()
            .all(|c| !c.starts_with("wmic")),
        "no fallback once df answered"
    );

    harness.inventory.clear_operations();
    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    assert!(harness.inventory.operations().is_empty());
}

#[tokio::test]
async fn containers_and_vms_never_share_a_cluster() {
    let harness = Harness::new();
    let script = HostScript::new()
        .with_vms(&[("web", None)])
        .with_containers(r#"{"Names":"web","Image":"nginx:1.27","State":"exited"}"#);
    harness.shell.host(HOST_A, script.clone());
    harness.shell.host(HOST_B, script);

    let naming = ClusterNaming {
        overrides: HashMap::from([(HOST_B.to_string(), "Homelab".to_string())]),
        ..ClusterNaming::default()
    };
    let service = service(&harness.shell, &harness.http, harness.inventory.clone(), naming);
    service.run_cycle(&hosts(), &everyone()).await.unwrap();

    let mut names: Vec<String> = harness
        .inventory
        .records(ObjectKind::Cluster)
        .iter()
        .filter_map(|c| c.str_field("name").map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Cluster-alpha", "Docker-Homelab", "Docker-alpha", "Homelab"]);

    let homelab = harness
        .inventory
        .find(ObjectKind::Cluster, &Filter::new().eq("name", "Docker-Homelab"))
        .unwrap();
    let container = harness
        .inventory
        .find(
            ObjectKind::VirtualMachine,
            &Filter::new().eq("name", "web").eq("cluster_id", homelab.id),
        )
        .unwrap();
    assert_eq!(container.str_field("status"), Some("offline"));
    assert_eq!(container.custom_fields().get("docker_image"), Some(&json!("nginx:1.27")));
    assert_eq!(harness.inventory.records(ObjectKind::VirtualMachine).len(), 4);

    harness.inventory.clear_operations();
    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    assert!(harness.inventory.operations().is_empty());
}

#[tokio::test]
async fn sweep_registers_addresses_of_known_devices_only() {
    let harness = Harness::new();
    let printer = harness.inventory.seed(ObjectKind::Device, json!({"name": "printer"}));
    let mgmt = harness.inventory.seed(
        ObjectKind::DeviceInterface,
        json!({"name": "mgmt0", "device": printer.id, "mac_address": "AA:BB:CC:00:00:30"}),
    );
    let runner = FakeRunner::default();
    runner.answer(
        "Nmap scan report for 192.168.178.30\n\
         Host is up (0.0010s latency).\n\
         MAC Address: aa:bb:cc:00:00:30 (Raspberry Pi)\n\
         Nmap scan report for 192.168.178.31\n\
         MAC Address: AA:BB:CC:00:00:31 (Unknown)\n",
    );
    let service = harness.service().with_sweeper(SubnetSweeper::new(
        Arc::new(runner.clone()),
        SweepSettings {
            subnets: vec!["192.168.178.0/24".into()],
            timeout: std::time::Duration::from_secs(30),
        },
    ));

    let report = service.run_cycle(&hosts(), &everyone()).await.unwrap();

    assert_eq!(runner.calls(), vec!["nmap -sn -PR --send-eth 192.168.178.0/24"]);
    let sweep = report.sweep.as_ref().expect("sweep ran");
    assert_eq!(sweep.neighbors, 2);
    assert_eq!(sweep.unregistered.len(), 1);
    assert_eq!(sweep.unregistered[0].address.to_string(), "192.168.178.31");
    assert_eq!(report.totals().created, sweep.summary.created);

    let address = harness
        .inventory
        .find(ObjectKind::IpAddress, &Filter::new().eq("address", "192.168.178.30"))
        .unwrap();
    assert_eq!(address.ref_id("assigned_object_id"), Some(mgmt.id));
    assert_eq!(address.str_field("assigned_object_type"), Some("dcim.interface"));
    assert_eq!(harness.inventory.records(ObjectKind::Device).len(), 1);

    harness.inventory.clear_operations();
    service.run_cycle(&hosts(), &everyone()).await.unwrap();
    assert!(harness.inventory.operations().is_empty());
}

#[tokio::test]
async fn commands_run_in_order_and_capacity_only_with_disk() {
    let harness = Harness::new();
    harness
        .shell
        .host(HOST_B, HostScript::new().with_vms(&[("web", None)]));

    harness
        .service()
        .run_cycle(&hosts(), &everyone())
        .await
        .unwrap();

    let commands = harness.shell.commands_for(HOST_B);
    assert_eq!(commands[0], vbox::LIST_VMS_COMMAND);
    assert_eq!(commands[1], vbox::detail_command("web"));
    assert!(!commands.iter().any(|c| c.contains("showmediuminfo")));
}

#[tokio::test]
async fn missing_credentials_abort_before_any_write() {
    let harness = Harness::new();
    harness
        .shell
        .host(HOST_B, HostScript::new().with_vms(&[("web", None)]));

    let credentials = StaticCredentials {
        missing: vec!["bravo".into()],
    };
    let result = harness.service().run_cycle(&hosts(), &credentials).await;

    assert!(matches!(result, Err(CycleError::MissingCredentials(name)) if name == "bravo"));
    assert!(harness.inventory.operations().is_empty());
    assert!(harness.shell.commands_for(HOST_B).is_empty());
}

#[tokio::test]
async fn offline_inventory_aborts_the_cycle() {
    let harness = Harness::new();
    harness.inventory.set_offline(true);

    let result = harness.service().run_cycle(&hosts(), &everyone()).await;
    assert!(matches!(result, Err(CycleError::InventoryUnavailable(_))));
}
