//! # Host Network Interface
//!
//! [`NetworkChip`] backend for a Linux netdev (e.g. a W5500 bound to the
//! `w5100` kernel driver, or any on-board NIC).
//!
//! The kernel owns the controller, so this backend configures it through
//! the usual userspace tools:
//! - Chip identity and MAC from `/sys/class/net/<iface>`
//! - Carrier state from `operstate`
//! - Leases from a DHCP client (`udhcpc` by default)
//! - Static addresses and the default route via iproute2 (`ip`)
//! - The interface's own IPv4 address read back with `ip -4 addr show dev`
//! - Gateway from `/proc/net/route`, DNS server from `/etc/resolv.conf`

use async_trait::async_trait;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::chip::{ChipInfo, LeaseError, NetworkChip};
use super::{IfConfig, MacAddress};
use crate::error::HardwareError;

const SYSFS_NET_ROOT: &str = "/sys/class/net";
const PROC_NET_ROUTE: &str = "/proc/net/route";
const RESOLV_CONF: &str = "/etc/resolv.conf";
const IP_PROGRAM: &str = "ip";

/// Interval between polls while waiting for a leased address to appear
const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Route flag: route uses a gateway
const RTF_GATEWAY: u32 = 0x0002;

/// Failure running an external network tool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("could not run {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Runs the userspace tools that configure a kernel netdev
#[async_trait]
pub trait NetTool: Send + Sync {
    /// Run `program` to completion and return its stdout
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ToolError>;
}

/// [`NetTool`] that spawns child processes
///
/// A dropped run kills its child.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTool;

#[async_trait]
impl NetTool for SystemTool {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ToolError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ToolError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Route of one interface parsed from `/proc/net/route`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RouteEntry {
    destination: Ipv4Addr,
    gateway: Ipv4Addr,
    flags: u32,
}

/// Linux network interface configured through iproute2 and a DHCP client
pub struct HostInterface {
    name: String,
    sysfs_net: PathBuf,
    proc_route: PathBuf,
    resolv_conf: PathBuf,
    dhcp_client: Option<String>,
    tool: Box<dyn NetTool>,
}

impl HostInterface {
    /// Manage interface `name` using the standard kernel paths
    pub fn new(name: &str) -> Self {
        Self::with_roots(name, SYSFS_NET_ROOT, PROC_NET_ROUTE, RESOLV_CONF)
    }

    /// Manage interface `name` with sysfs, the route table and resolv.conf
    /// at alternate paths
    pub fn with_roots<P: Into<PathBuf>, Q: Into<PathBuf>, S: Into<PathBuf>>(
        name: &str,
        sysfs_net: P,
        proc_route: Q,
        resolv_conf: S,
    ) -> Self {
        Self {
            name: name.to_string(),
            sysfs_net: sysfs_net.into(),
            proc_route: proc_route.into(),
            resolv_conf: resolv_conf.into(),
            dhcp_client: None,
            tool: Box::new(SystemTool),
        }
    }

    /// DHCP client to run per lease request; empty waits for the OS to lease
    pub fn with_dhcp_client(mut self, client: &str) -> Self {
        self.dhcp_client = (!client.is_empty()).then(|| client.to_string());
        self
    }

    pub fn with_tool<T: NetTool + 'static>(mut self, tool: T) -> Self {
        self.tool = Box::new(tool);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn iface_dir(&self) -> PathBuf {
        self.sysfs_net.join(&self.name)
    }

    fn read_attr(&self, attr: &str) -> std::io::Result<String> {
        fs::read_to_string(self.iface_dir().join(attr)).map(|s| s.trim().to_string())
    }

    /// Kernel driver bound to the interface, falling back to the interface name
    fn driver_name(&self) -> String {
        fs::read_to_string(self.iface_dir().join("device").join("uevent"))
            .ok()
            .and_then(|uevent| {
                uevent
                    .lines()
                    .find_map(|line| line.strip_prefix("DRIVER=").map(str::to_string))
            })
            .unwrap_or_else(|| self.name.clone())
    }

    fn has_carrier(&self) -> bool {
        matches!(self.read_attr("operstate").as_deref(), Ok("up") | Ok("unknown"))
    }

    fn lease_failure(&self, timeout: Duration) -> LeaseError {
        if self.has_carrier() {
            LeaseError::Timeout(timeout)
        } else {
            LeaseError::NoCarrier
        }
    }

    async fn ip(&self, args: &[&str]) -> Result<String, HardwareError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.tool
            .run(IP_PROGRAM, &args)
            .await
            .map_err(|e| HardwareError::Configure(format!("{}: {}", self.name, e)))
    }

    /// IPv4 addresses assigned to this interface, with prefix length
    async fn addresses(&self) -> Result<Vec<(Ipv4Addr, u8)>, HardwareError> {
        let listing = self
            .ip(&["-4", "-o", "addr", "show", "dev", self.name.as_str()])
            .await?;
        Ok(parse_inet_addrs(&listing))
    }

    fn default_gateway(&self) -> Option<Ipv4Addr> {
        let table = match fs::read_to_string(&self.proc_route) {
            Ok(table) => table,
            Err(e) => {
                debug!("Could not read {}: {}", self.proc_route.display(), e);
                return None;
            }
        };

        parse_routes(&table, &self.name)
            .into_iter()
            .find(|r| r.destination.is_unspecified() && r.flags & RTF_GATEWAY != 0)
            .map(|r| r.gateway)
    }

    fn nameserver(&self) -> Option<Ipv4Addr> {
        fs::read_to_string(&self.resolv_conf)
            .ok()
            .and_then(|conf| parse_nameserver(&conf))
    }

    /// Current addressing once the interface has an address and a default route
    async fn current_lease(&self) -> Result<Option<IfConfig>, HardwareError> {
        let Some(gateway) = self.default_gateway() else {
            return Ok(None);
        };
        let Some(&(ip, prefix)) = self.addresses().await?.first() else {
            return Ok(None);
        };

        Ok(Some(IfConfig {
            ip,
            subnet_mask: prefix_to_mask(prefix),
            gateway,
            dns: self.nameserver().unwrap_or(gateway),
        }))
    }
}

#[async_trait]
impl NetworkChip for HostInterface {
    async fn initialize(&mut self, mac: MacAddress) -> Result<ChipInfo, HardwareError> {
        let address = self.read_attr("address").map_err(|e| {
            HardwareError::BusUnresponsive(format!("interface {} not present: {}", self.name, e))
        })?;
        let actual: MacAddress = address
            .parse()
            .map_err(HardwareError::BusUnresponsive)?;

        if actual != mac {
            warn!(
                "Interface {} uses MAC {} (configured {}); kernel-managed MAC kept",
                self.name, actual, mac
            );
        }

        Ok(ChipInfo {
            chip: self.driver_name(),
            mac: actual,
        })
    }

    async fn request_lease(&mut self, timeout: Duration) -> Result<IfConfig, LeaseError> {
        let deadline = Instant::now() + timeout;

        self.ip(&["link", "set", "dev", self.name.as_str(), "up"]).await?;

        if let Some(client) = &self.dhcp_client {
            let args: Vec<String> = ["-i", self.name.as_str(), "-n", "-q", "-f"]
                .iter()
                .map(|arg| arg.to_string())
                .collect();

            match tokio::time::timeout_at(deadline, self.tool.run(client, &args)).await {
                Ok(Ok(_)) => debug!("{} obtained a lease on {}", client, self.name),
                Ok(Err(e)) => {
                    warn!("DHCP client on {} failed: {}", self.name, e);
                    return Err(self.lease_failure(timeout));
                }
                Err(_) => return Err(self.lease_failure(timeout)),
            }
        }

        loop {
            if self.has_carrier() {
                if let Some(lease) = self.current_lease().await? {
                    return Ok(lease);
                }
            }

            if Instant::now() >= deadline {
                return Err(self.lease_failure(timeout));
            }

            tokio::time::sleep(LEASE_POLL_INTERVAL).await;
        }
    }

    async fn apply_static(&mut self, config: &IfConfig) -> Result<(), HardwareError> {
        if !self.iface_dir().exists() {
            return Err(HardwareError::BusUnresponsive(format!(
                "interface {} not present",
                self.name
            )));
        }

        let name = self.name.as_str();
        let address = format!("{}/{}", config.ip, mask_to_prefix(config.subnet_mask));

        self.ip(&["link", "set", "dev", name, "up"]).await?;
        self.ip(&["addr", "replace", address.as_str(), "dev", name]).await?;
        if !config.gateway.is_unspecified() {
            let gateway = config.gateway.to_string();
            self.ip(&["route", "replace", "default", "via", gateway.as_str(), "dev", name])
                .await?;
        }

        if !self.addresses().await?.iter().any(|(ip, _)| *ip == config.ip) {
            return Err(HardwareError::Configure(format!(
                "{} does not carry {} after configuration",
                name, address
            )));
        }

        info!(
            "Applied {} via {} on {}; DNS {} is left to the system resolver",
            address, config.gateway, name, config.dns
        );
        Ok(())
    }
}

fn mask_to_prefix(mask: Ipv4Addr) -> u32 {
    u32::from(mask).count_ones()
}

fn prefix_to_mask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    Ipv4Addr::from(u32::MAX.checked_shl(32 - prefix).unwrap_or(0))
}

/// Parse `ip -4 -o addr show` output into address and prefix pairs
fn parse_inet_addrs(listing: &str) -> Vec<(Ipv4Addr, u8)> {
    listing
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            words.find(|word| *word == "inet")?;
            let (ip, prefix) = words.next()?.split_once('/')?;
            Some((ip.parse().ok()?, prefix.parse().ok()?))
        })
        .collect()
}

/// Parse a little-endian hex address as found in `/proc/net/route`
fn parse_route_addr(hex: &str) -> Option<Ipv4Addr> {
    u32::from_str_radix(hex, 16)
        .ok()
        .map(|raw| Ipv4Addr::from(raw.to_le_bytes()))
}

fn parse_routes(table: &str, iface: &str) -> Vec<RouteEntry> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 8 || cols[0] != iface {
                return None;
            }
            Some(RouteEntry {
                destination: parse_route_addr(cols[1])?,
                gateway: parse_route_addr(cols[2])?,
                flags: u32::from_str_radix(cols[3], 16).ok()?,
            })
        })
        .collect()
}

fn parse_nameserver(conf: &str) -> Option<Ipv4Addr> {
    conf.lines()
        .filter_map(|line| line.trim().strip_prefix("nameserver"))
        .find_map(|rest| rest.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::link::reset::NoResetLine;
    use crate::link::{Addressing, LinkController};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
wlan0\t0000000A\t00000000\t0001\t0\t0\t600\t000000FF\t0\t0\t0
";

    #[derive(Default)]
    struct ToolState {
        calls: Vec<Vec<String>>,
        /// `ip -o addr` lines per interface
        addresses: HashMap<String, String>,
        /// Address the DHCP client leases, as `a.b.c.d/len`
        lease: Option<String>,
        /// Interface silently drops `addr replace`
        ignore_writes: bool,
        /// `ip` refuses every change
        deny_changes: bool,
    }

    /// Emulates iproute2 and udhcpc against an in-memory address table
    #[derive(Clone, Default)]
    struct MockTool {
        state: Arc<Mutex<ToolState>>,
    }

    impl MockTool {
        fn assign(&self, dev: &str, cidr: &str) {
            let mut state = self.state.lock().unwrap();
            let line = format!("2: {}    inet {} scope global {}\n", dev, cidr, dev);
            state.addresses.entry(dev.to_string()).or_default().push_str(&line);
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
            .unwrap_or_default()
    }

    #[async_trait]
    impl NetTool for MockTool {
        async fn run(&self, program: &str, args: &[String]) -> Result<String, ToolError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            let (lease, ignore_writes, deny_changes) = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(call);
                (state.lease.clone(), state.ignore_writes, state.deny_changes)
            };

            if program == "udhcpc" {
                return match lease {
                    Some(cidr) => {
                        self.assign(arg_after(args, "-i"), &cidr);
                        Ok(String::new())
                    }
                    None => Err(ToolError::Failed {
                        program: program.to_string(),
                        status: "exit status: 1".to_string(),
                        stderr: "udhcpc: no lease, failing".to_string(),
                    }),
                };
            }

            if args.iter().any(|a| a == "show") {
                let state = self.state.lock().unwrap();
                let dev = arg_after(args, "dev");
                return Ok(state.addresses.get(dev).cloned().unwrap_or_default());
            }

            if deny_changes {
                return Err(ToolError::Failed {
                    program: program.to_string(),
                    status: "exit status: 2".to_string(),
                    stderr: "RTNETLINK answers: Operation not permitted".to_string(),
                });
            }

            if args.first().map(String::as_str) == Some("addr") && !ignore_writes {
                self.assign(arg_after(args, "dev"), &args[2]);
            }
            Ok(String::new())
        }
    }

    fn fake_iface(root: &Path, name: &str, mac: &str, operstate: &str) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("device")).unwrap();
        fs::write(dir.join("address"), format!("{}\n", mac)).unwrap();
        fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
        fs::write(dir.join("device").join("uevent"), "DRIVER=w5100\nOF_NAME=ethernet\n").unwrap();
    }

    /// eth0 (up) plus a route table and resolv.conf under `root`
    fn host(root: &Path, tool: &MockTool) -> HostInterface {
        fake_iface(root, "eth0", "de:ad:be:ef:fe:ed", "up");
        let routes = root.join("route");
        let resolv = root.join("resolv.conf");
        fs::write(&routes, ROUTE_TABLE).unwrap();
        fs::write(&resolv, "nameserver 192.168.1.53\n").unwrap();
        HostInterface::with_roots("eth0", root, routes, resolv).with_tool(tool.clone())
    }

    fn static_config() -> IfConfig {
        IfConfig {
            ip: Ipv4Addr::new(192, 168, 1, 100),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
        }
    }

    fn words(call: &[&str]) -> Vec<String> {
        call.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_routes_filters_interface() {
        let routes = parse_routes(ROUTE_TABLE, "eth0");
        assert_eq!(routes.len(), 2);

        assert_eq!(routes[0].destination, Ipv4Addr::UNSPECIFIED);
        assert_eq!(routes[0].gateway, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(routes[0].flags & RTF_GATEWAY, RTF_GATEWAY);

        assert_eq!(routes[1].destination, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(routes[1].flags & RTF_GATEWAY, 0);
    }

    #[test]
    fn test_parse_routes_ignores_malformed_lines() {
        let routes = parse_routes("header\neth0\tzz\n\neth0\t00000000\n", "eth0");
        assert!(routes.is_empty());
    }

    #[test]
    fn test_parse_nameserver() {
        let conf = "# generated\nsearch lan\nnameserver 192.168.1.53\nnameserver 8.8.8.8\n";
        assert_eq!(parse_nameserver(conf), Some(Ipv4Addr::new(192, 168, 1, 53)));
        assert_eq!(parse_nameserver("nameserver fe80::1\n"), None);
        assert_eq!(parse_nameserver(""), None);
    }

    #[test]
    fn test_parse_inet_addrs() {
        let listing = "\
2: eth0    inet 192.168.1.57/24 brd 192.168.1.255 scope global dynamic eth0\\       valid_lft 86390sec preferred_lft 86390sec
2: eth0    inet 169.254.10.2/16 scope link eth0\\       valid_lft forever preferred_lft forever
";
        assert_eq!(
            parse_inet_addrs(listing),
            vec![
                (Ipv4Addr::new(192, 168, 1, 57), 24),
                (Ipv4Addr::new(169, 254, 10, 2), 16)
            ]
        );
        assert!(parse_inet_addrs("").is_empty());
        assert!(parse_inet_addrs("2: eth0    inet6 fe80::1/64 scope link\n").is_empty());
    }

    #[test]
    fn test_prefix_mask_conversion() {
        assert_eq!(mask_to_prefix(Ipv4Addr::new(255, 255, 255, 0)), 24);
        assert_eq!(mask_to_prefix(Ipv4Addr::UNSPECIFIED), 0);
        assert_eq!(prefix_to_mask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_to_mask(32), Ipv4Addr::BROADCAST);
        assert_eq!(prefix_to_mask(0), Ipv4Addr::UNSPECIFIED);
        assert_eq!(prefix_to_mask(40), Ipv4Addr::BROADCAST);
    }

    #[tokio::test]
    async fn test_initialize_reads_driver_and_mac() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", "de:ad:be:ef:fe:ed", "up");

        let mut iface = HostInterface::with_roots("eth0", dir.path(), "/nonexistent", "/nonexistent")
            .with_tool(MockTool::default());
        let info = iface
            .initialize(MacAddress([0xde, 0xad, 0xbe, 0xef, 0xfe, 0xed]))
            .await
            .unwrap();

        assert_eq!(info.chip, "w5100");
        assert_eq!(info.mac.to_string(), "de:ad:be:ef:fe:ed");
    }

    #[tokio::test]
    async fn test_initialize_missing_interface_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut iface = HostInterface::with_roots("eth9", dir.path(), "/nonexistent", "/nonexistent")
            .with_tool(MockTool::default());

        let result = iface.initialize(MacAddress([0; 6])).await;
        assert!(matches!(result, Err(HardwareError::BusUnresponsive(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_without_carrier() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", "de:ad:be:ef:fe:ed", "down");

        let mut iface = HostInterface::with_roots("eth0", dir.path(), "/nonexistent", "/nonexistent")
            .with_tool(MockTool::default());
        let result = iface.request_lease(Duration::from_secs(2)).await;

        assert_eq!(result, Err(LeaseError::NoCarrier));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_times_out_without_default_route() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", "de:ad:be:ef:fe:ed", "up");
        let routes = dir.path().join("route");
        fs::write(&routes, "Iface\tDestination\n").unwrap();

        let mut iface = HostInterface::with_roots("eth0", dir.path(), &routes, "/nonexistent")
            .with_tool(MockTool::default());
        let result = iface.request_lease(Duration::from_secs(2)).await;

        assert_eq!(result, Err(LeaseError::Timeout(Duration::from_secs(2))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_runs_dhcp_client() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.state.lock().unwrap().lease = Some("192.168.1.57/24".to_string());
        let mut iface = host(dir.path(), &tool).with_dhcp_client("udhcpc");

        let lease = iface.request_lease(Duration::from_secs(10)).await.unwrap();

        assert_eq!(
            lease,
            IfConfig {
                ip: Ipv4Addr::new(192, 168, 1, 57),
                subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                dns: Ipv4Addr::new(192, 168, 1, 53),
            }
        );
        let calls = tool.calls();
        assert_eq!(calls[0], words(&["ip", "link", "set", "dev", "eth0", "up"]));
        assert_eq!(calls[1], words(&["udhcpc", "-i", "eth0", "-n", "-q", "-f"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_reports_only_this_interface_address() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.assign("wlan0", "10.0.0.5/24");
        tool.assign("eth0", "192.168.1.57/24");
        let mut iface = host(dir.path(), &tool);

        let lease = iface.request_lease(Duration::from_secs(2)).await.unwrap();

        assert_eq!(lease.ip, Ipv4Addr::new(192, 168, 1, 57));
        assert!(tool
            .calls()
            .contains(&words(&["ip", "-4", "-o", "addr", "show", "dev", "eth0"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dhcp_client_is_a_lease_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        let mut iface = host(dir.path(), &tool).with_dhcp_client("udhcpc");

        let result = iface.request_lease(Duration::from_secs(2)).await;

        assert_eq!(result, Err(LeaseError::Timeout(Duration::from_secs(2))));
    }

    #[tokio::test]
    async fn test_empty_dhcp_client_waits_for_os() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.assign("eth0", "192.168.1.57/24");
        let mut iface = host(dir.path(), &tool).with_dhcp_client("");

        iface.request_lease(Duration::from_secs(2)).await.unwrap();

        assert!(tool.calls().iter().all(|call| call[0] == "ip"));
    }

    #[tokio::test]
    async fn test_apply_static_configures_interface() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        let mut iface = host(dir.path(), &tool);

        iface.apply_static(&static_config()).await.unwrap();

        assert_eq!(
            tool.calls(),
            vec![
                words(&["ip", "link", "set", "dev", "eth0", "up"]),
                words(&["ip", "addr", "replace", "192.168.1.100/24", "dev", "eth0"]),
                words(&["ip", "route", "replace", "default", "via", "192.168.1.1", "dev", "eth0"]),
                words(&["ip", "-4", "-o", "addr", "show", "dev", "eth0"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_static_fails_when_address_not_taken() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.state.lock().unwrap().ignore_writes = true;
        let mut iface = host(dir.path(), &tool);

        let result = iface.apply_static(&static_config()).await;

        assert!(matches!(result, Err(HardwareError::Configure(msg)) if msg.contains("192.168.1.100/24")));
    }

    #[tokio::test]
    async fn test_apply_static_refused_by_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.state.lock().unwrap().deny_changes = true;
        let mut iface = host(dir.path(), &tool);

        let result = iface.apply_static(&static_config()).await;

        assert!(matches!(result, Err(HardwareError::Configure(msg)) if msg.contains("not permitted")));
    }

    #[tokio::test]
    async fn test_apply_static_requires_interface() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = HostInterface::with_roots("eth1", dir.path(), "/nonexistent", "/nonexistent")
            .with_tool(MockTool::default());

        let result = missing.apply_static(&static_config()).await;
        assert!(matches!(result, Err(HardwareError::BusUnresponsive(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_bring_up_puts_address_on_interface() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        let mut link = LinkController::new(host(dir.path(), &tool), NoResetLine, NetworkConfig::for_tests(false));

        let handle = link.bring_up().await.unwrap();

        assert_eq!(handle.ip(), Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(handle.addressing(), Addressing::Static);
        let state = tool.state.lock().unwrap();
        assert!(state.addresses["eth0"].contains("inet 192.168.1.100/24"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_bring_up_fails_on_unconfigured_interface() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MockTool::default();
        tool.state.lock().unwrap().ignore_writes = true;
        let iface = host(dir.path(), &tool);
        fake_iface(dir.path(), "eth0", "de:ad:be:ef:fe:ed", "down");
        let mut link = LinkController::new(iface, NoResetLine, NetworkConfig::for_tests(false));

        let result = link.bring_up().await;

        assert!(matches!(result, Err(HardwareError::Configure(_))));
    }
}
