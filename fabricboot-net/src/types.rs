//! Core data model for fabric provisioning.
//!
//! These are validated records constructed once at the configuration
//! boundary; the provisioning code never sees raw, loosely-typed input.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use fabricboot_common::MacAddr;

/// Drivers considered "ten gig" for the `use_ten_gig_only` pool filter.
pub const TEN_GIG_DRIVERS: &[&str] = &["ixgbe", "i40e"];

/// Driver allowlist used when a vswitch declares no uplink matchers.
pub const DEFAULT_UPLINK_DRIVERS: &[&str] =
    &["igb", "ixgbe", "i40e", "mlx4_core", "mlx5_core"];

/// Highest VLAN id accepted on an interface or device.
pub const MAX_VLAN_ID: u16 = 4094;

/// Snapshot of one discovered physical NIC.
///
/// Rebuilt fresh on every provisioning pass; there is no persisted identity
/// across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicRecord {
    /// Kernel interface name, e.g. `eth0`.
    pub name: String,
    /// Canonical lowercase MAC.
    pub mac: MacAddr,
    /// Bound kernel driver, e.g. `ixgbe`.
    pub driver: String,
    /// Full PCI bus address, e.g. `0000:01:00.0`.
    pub pci_addr: String,
    /// Supported link speeds in Mbps, as reported by the link probe.
    pub supported_speeds: Vec<u32>,
    /// Whether the link currently has carrier.
    pub link_up: bool,
}

impl NicRecord {
    /// Maximum supported speed, or `None` when the probe found nothing.
    pub fn max_speed(&self) -> Option<u32> {
        self.supported_speeds.iter().copied().max()
    }

    /// Whether the NIC supports at least one of the given speeds.
    pub fn supports_any(&self, speeds: &[u32]) -> bool {
        speeds.iter().any(|s| self.supported_speeds.contains(s))
    }
}

/// Sort a pool descending by max supported speed, so that matcher evaluation
/// lets higher-speed NICs win ties.
pub fn sort_by_speed(pool: &mut [NicRecord]) {
    pool.sort_by(|a, b| {
        b.max_speed()
            .unwrap_or(0)
            .cmp(&a.max_speed().unwrap_or(0))
    });
}

/// Link-aggregation policy for a multi-uplink vswitch.
///
/// Only the modes validated in the lab are accepted; anything else is warned
/// about at the configuration boundary and dropped, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BondMode {
    ActiveBackup,
    BalanceSlb,
    BalanceTcp,
}

impl BondMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondMode::ActiveBackup => "active-backup",
            BondMode::BalanceSlb => "balance-slb",
            BondMode::BalanceTcp => "balance-tcp",
        }
    }
}

impl Default for BondMode {
    fn default() -> Self {
        BondMode::ActiveBackup
    }
}

impl FromStr for BondMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active-backup" => Ok(BondMode::ActiveBackup),
            "balance-slb" => Ok(BondMode::BalanceSlb),
            "balance-tcp" => Ok(BondMode::BalanceTcp),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared virtual switch.
#[derive(Debug, Clone)]
pub struct VSwitchSpec {
    /// Unique bridge name, e.g. `br0`.
    pub name: String,
    /// Ordered uplink matchers: interface name, MAC, or driver. Empty means
    /// "match the default driver allowlist" unless this is the sole spec, in
    /// which case it absorbs the whole remaining pool.
    pub uplinks: Vec<String>,
    /// Optional speed filter in Mbps. A matched NIC must support at least
    /// one listed speed.
    pub uplink_speeds: Vec<u32>,
    /// Bond mode for multi-uplink switches.
    pub bond_mode: Option<BondMode>,
    /// LACP mode passed through to the bond port, e.g. `active`.
    pub lacp: Option<String>,
    /// MTU written to each physical uplink's persisted config.
    pub mtu: u32,
    /// Extra `other_config:` key=value settings on the bond port.
    pub other_config: Vec<String>,
}

impl VSwitchSpec {
    /// Name of the bond port created for this switch's uplinks.
    pub fn bond_name(&self) -> String {
        format!("{}-up", self.name)
    }
}

/// Declared host-facing logical interface on a vswitch.
#[derive(Debug, Clone)]
pub struct HostInterfaceSpec {
    /// Interface name. When equal to `vswitch`, the bridge itself serves as
    /// the interface and no internal port is created.
    pub name: String,
    /// Backing vswitch; must reference a declared [`VSwitchSpec`].
    pub vswitch: String,
    /// Optional 802.1Q tag (0..=4094).
    pub vlan: Option<u16>,
    /// Static addressing, used only for post-configure connectivity repair.
    pub ip: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

/// Result of partitioning the NIC pool across vswitches: vswitch name to
/// ordered uplink interface names. A NIC is assigned to at most one vswitch.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    entries: Vec<(String, Vec<String>)>,
}

impl Assignment {
    pub fn record(&mut self, vswitch: &str, uplinks: Vec<String>) {
        self.entries.push((vswitch.to_string(), uplinks));
    }

    pub fn uplinks_for(&self, vswitch: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == vswitch)
            .map(|(_, uplinks)| uplinks.as_slice())
    }

    /// Iterate assignments in vswitch declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, uplinks)| (name.as_str(), uplinks.as_slice()))
    }

    /// All assigned uplink names, across every vswitch.
    pub fn all_uplinks(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|(_, uplinks)| uplinks.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn test_nic(name: &str, mac: &str, driver: &str, speeds: &[u32]) -> NicRecord {
    NicRecord {
        name: name.to_string(),
        mac: mac.parse().unwrap(),
        driver: driver.to_string(),
        pci_addr: format!("0000:00:0{}.0", name.len() % 10),
        supported_speeds: speeds.to_vec(),
        link_up: true,
    }
}
