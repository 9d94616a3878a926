//! NIC inventory provider.
//!
//! The provisioning pipeline only depends on the [`NicInventoryProvider`]
//! seam; the sysfs-backed implementation here keeps the hardware probing
//! thin. USB ethernet devices (`cdc_ether`) and NICs reserved for PCI
//! passthrough never enter the pool.

use std::path::PathBuf;

use tracing::{debug, warn};

use fabricboot_common::{CommandRunner, MacAddr, RunOpts};

use crate::error::{NetworkError, Result};
use crate::types::NicRecord;

/// Driver name of USB ethernet adapters, excluded from the pool.
const USB_ETHERNET_DRIVER: &str = "cdc_ether";

/// Supplies a snapshot of discovered physical NICs.
pub trait NicInventoryProvider {
    /// Discover physical NICs, excluding the given PCI bus addresses.
    fn snapshot(&self, excluded_bus_addrs: &[String]) -> Result<Vec<NicRecord>>;
}

/// Inventory built from `/sys/class/net` plus an `ethtool` link probe.
pub struct SysfsInventory<'a> {
    runner: &'a dyn CommandRunner,
    sysfs_net: PathBuf,
}

impl<'a> SysfsInventory<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            sysfs_net: PathBuf::from("/sys/class/net"),
        }
    }

    /// Override the sysfs root; used by tests.
    pub fn with_sysfs_net(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_net = root.into();
        self
    }

    /// Supported link speeds in Mbps for an interface, via `ethtool`.
    /// Returns an empty list when the probe fails or reports nothing.
    fn supported_speeds(&self, iface: &str) -> Vec<u32> {
        let opts = RunOpts::once().quiet();
        let out = match self.runner.run(&["ethtool", iface], &opts) {
            Ok(out) if out.success() => out,
            _ => return Vec::new(),
        };
        parse_supported_speeds(&out.stdout)
    }

    fn link_detected(&self, iface: &str) -> bool {
        let opts = RunOpts::once().quiet();
        match self.runner.run(&["ethtool", iface], &opts) {
            Ok(out) if out.success() => out
                .stdout
                .lines()
                .any(|l| l.trim().starts_with("Link detected:") && l.contains("yes")),
            _ => false,
        }
    }
}

impl NicInventoryProvider for SysfsInventory<'_> {
    fn snapshot(&self, excluded_bus_addrs: &[String]) -> Result<Vec<NicRecord>> {
        let mut nics = Vec::new();

        let entries = std::fs::read_dir(&self.sysfs_net)
            .map_err(|e| NetworkError::Inventory(format!("read {:?}: {e}", self.sysfs_net)))?;

        for entry in entries {
            let entry =
                entry.map_err(|e| NetworkError::Inventory(format!("read dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();

            // Resolve the symlink and keep only PCI-backed devices.
            let real = match std::fs::canonicalize(entry.path()) {
                Ok(path) => path,
                Err(_) => continue,
            };
            if !real.to_string_lossy().contains("/devices/pci") {
                continue;
            }

            // The netdev path ends .../<pci_addr>/net/<name>; the PCI bus
            // address is two levels up.
            let pci_addr = match real
                .parent()
                .and_then(|p| p.parent())
                .and_then(|p| p.file_name())
            {
                Some(addr) => addr.to_string_lossy().to_string(),
                None => continue,
            };
            if excluded_bus_addrs.iter().any(|a| *a == pci_addr) {
                debug!(nic = %name, pci = %pci_addr, "excluding passthrough NIC");
                continue;
            }

            let mac_raw = std::fs::read_to_string(real.join("address"))
                .map_err(|e| NetworkError::Inventory(format!("read MAC of {name}: {e}")))?;
            let mac: MacAddr = match mac_raw.parse() {
                Ok(mac) => mac,
                Err(_) => {
                    warn!(nic = %name, addr = %mac_raw.trim(), "skipping NIC with unparseable MAC");
                    continue;
                }
            };

            let driver = std::fs::canonicalize(real.join("device/driver"))
                .ok()
                .and_then(|p| p.file_name().map(|f| f.to_string_lossy().to_string()))
                .unwrap_or_default();
            if driver == USB_ETHERNET_DRIVER {
                continue;
            }

            nics.push(NicRecord {
                supported_speeds: self.supported_speeds(&name),
                link_up: self.link_detected(&name),
                name,
                mac,
                driver,
                pci_addr,
            });
        }

        Ok(nics)
    }
}

/// Parse the "Supported link modes" block of ethtool output into Mbps values.
fn parse_supported_speeds(ethtool_out: &str) -> Vec<u32> {
    let mut speeds = Vec::new();
    let mut in_block = false;
    for line in ethtool_out.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Supported link modes:") {
            in_block = true;
            collect_mode_speeds(rest, &mut speeds);
            continue;
        }
        if in_block {
            // Continuation lines are indented mode lists; anything else ends
            // the block.
            if trimmed
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
            {
                collect_mode_speeds(trimmed, &mut speeds);
            } else {
                break;
            }
        }
    }
    speeds
}

/// Pull the leading speed number out of each mode token like `10000baseT/Full`.
fn collect_mode_speeds(line: &str, speeds: &mut Vec<u32>) {
    for token in line.split_whitespace() {
        let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(speed) = digits.parse::<u32>() {
            if !speeds.contains(&speed) {
                speeds.push(speed);
            }
        }
    }
}
