//! Host-facing interface reconciler.
//!
//! Creates the logical interfaces the host itself uses on each vswitch,
//! applies VLAN tags, and records which physical uplinks each interface
//! depends on. Interfaces are reloaded together in one batch after a settle
//! delay, never one at a time, so shared bonds are not thrashed mid-pass.

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument};

use fabricboot_common::{CommandRunner, RunOpts};

use crate::error::{NetworkError, Result};
use crate::ifcfg::IfcfgStore;
use crate::types::{Assignment, HostInterfaceSpec};

/// Delay before the batched interface reload, giving uplinks time to come up.
const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Pause between the gratuitous and unsolicited ARP announcements.
const DEFAULT_ARP_PAUSE: Duration = Duration::from_secs(2);

pub struct HostInterfaceReconciler<'a> {
    runner: &'a dyn CommandRunner,
    ifcfg: &'a dyn IfcfgStore,
    settle: Duration,
    arp_pause: Duration,
}

impl<'a> HostInterfaceReconciler<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ifcfg: &'a dyn IfcfgStore) -> Self {
        Self {
            runner,
            ifcfg,
            settle: DEFAULT_SETTLE,
            arp_pause: DEFAULT_ARP_PAUSE,
        }
    }

    /// Override the settle delays; used by tests.
    pub fn with_settle(mut self, settle: Duration, arp_pause: Duration) -> Self {
        self.settle = settle;
        self.arp_pause = arp_pause;
        self
    }

    /// Declare every host interface, then reload them all in one batch.
    #[instrument(skip_all, fields(interfaces = interfaces.len()))]
    pub fn reconcile(
        &self,
        interfaces: &[HostInterfaceSpec],
        assignment: &Assignment,
    ) -> Result<()> {
        for iface in interfaces {
            self.declare(iface, assignment)?;
        }

        // Let the uplinks come up before cycling everything at once.
        thread::sleep(self.settle);
        for iface in interfaces {
            let opts = RunOpts::once();
            let _ = self.runner.run(&["/sbin/ifdown", &iface.name], &opts);
            let _ = self.runner.run(&["/sbin/ifup", &iface.name], &opts);
        }
        let _ = self
            .runner
            .run(&["service", "network", "restart"], &RunOpts::once());

        Ok(())
    }

    fn declare(&self, iface: &HostInterfaceSpec, assignment: &Assignment) -> Result<()> {
        let mut cmds: Vec<Vec<String>> = Vec::new();

        // When the interface name differs from its vswitch, an internal port
        // must be created explicitly; otherwise the bridge itself serves as
        // the interface.
        if iface.name != iface.vswitch {
            cmds.push(vec![
                "add-port".into(),
                iface.vswitch.clone(),
                iface.name.clone(),
            ]);
            cmds.push(vec![
                "set".into(),
                "interface".into(),
                iface.name.clone(),
                "type=internal".into(),
            ]);
        }
        if let Some(vlan) = iface.vlan {
            cmds.push(vec![
                "set".into(),
                "port".into(),
                iface.name.clone(),
                format!("tag={vlan}"),
            ]);
        }

        if !cmds.is_empty() {
            let mut argv: Vec<&str> = vec!["ovs-vsctl"];
            for (i, cmd) in cmds.iter().enumerate() {
                if i > 0 {
                    argv.push("--");
                }
                argv.extend(cmd.iter().map(String::as_str));
            }
            self.runner.run_checked(&argv, &RunOpts::once())?;
        }

        // Record the physical uplinks this interface depends on so the
        // network scripts bring them up first.
        let uplinks = assignment.uplinks_for(&iface.vswitch).ok_or_else(|| {
            NetworkError::InvalidConfig(format!(
                "host interface {} references unknown vswitch {}",
                iface.name, iface.vswitch
            ))
        })?;
        self.ifcfg.append(
            &iface.name,
            "OVSREQUIRES",
            &format!("\"{}\"", uplinks.join(" ")),
        )?;

        info!(iface = %iface.name, vswitch = %iface.vswitch, vlan = ?iface.vlan, "declared host interface");
        Ok(())
    }

    /// Refresh upstream switch state for statically addressed interfaces.
    ///
    /// Some top-of-rack switches hold stale ARP entries after the bridge
    /// rewiring; announce the address and ping the broadcast once to nudge
    /// them. DHCP-configured interfaces are skipped.
    #[instrument(skip_all)]
    pub fn repair_connectivity(&self, interfaces: &[HostInterfaceSpec]) -> Result<()> {
        for iface in interfaces {
            let entries = self.ifcfg.read(&iface.name)?;
            if entries
                .get("BOOTPROTO")
                .map(|p| p.eq_ignore_ascii_case("dhcp"))
                .unwrap_or(false)
            {
                debug!(iface = %iface.name, "skipping DHCP interface");
                continue;
            }

            let ip = iface
                .ip
                .or_else(|| entries.get("IPADDR").and_then(|s| s.parse().ok()));
            let netmask = iface
                .netmask
                .or_else(|| entries.get("NETMASK").and_then(|s| s.parse().ok()));
            let (ip, netmask) = match (ip, netmask) {
                (Some(ip), Some(netmask)) => (ip, netmask),
                _ => continue,
            };

            let ip_str = ip.to_string();
            let opts = RunOpts::once();
            let _ = self.runner.run(
                &["arping", "-A", "-I", &iface.name, &ip_str, "-c", "1"],
                &opts,
            );
            thread::sleep(self.arp_pause);
            let _ = self.runner.run(
                &["arping", "-U", "-I", &iface.name, &ip_str, "-c", "1"],
                &opts,
            );

            // Broadcast ping helps some broken switches relearn the port.
            let broadcast = broadcast_addr(ip, netmask).to_string();
            let _ = self
                .runner
                .run(&["ping", "-b", "-c", "1", &broadcast, "-W", "1"], &opts);

            if let Some(gateway) = iface.gateway {
                let gateway = gateway.to_string();
                let _ = self
                    .runner
                    .run(&["ping", "-c", "1", &gateway, "-W", "1"], &opts);
            }
        }
        Ok(())
    }
}

/// Broadcast address of the subnet containing `ip`.
fn broadcast_addr(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}
