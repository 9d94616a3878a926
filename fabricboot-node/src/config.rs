//! Desired-state configuration for the provisioning pass.
//!
//! The YAML file is deserialized into loosely-constrained raw records and
//! then validated into the typed specs the provisioning crates consume.
//! Validation happens exactly once, here at the boundary.

use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use fabricboot_hypervisor::{CvmInterfaceSpec, INTERNAL_VSWITCH};
use fabricboot_net::types::MAX_VLAN_ID;
use fabricboot_net::{BondMode, HostInterfaceSpec, VSwitchSpec};

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restrict a matcherless sole vswitch to ten-gigabit drivers.
    pub use_ten_gig_only: bool,
    /// Declared virtual switches, in provisioning order.
    pub vswitches: Vec<VSwitchConfig>,
    /// Host-facing logical interfaces.
    pub host_interfaces: Vec<HostInterfaceConfig>,
    /// CVM-visible interfaces to reconcile against the live domain.
    pub cvm_interfaces: Vec<CvmInterfaceConfig>,
    /// RDMA passthrough selection.
    pub rdma: RdmaConfig,
    /// CVM access configuration.
    pub remote: RemoteConfig,
    /// Filesystem paths.
    pub paths: PathsConfig,
    /// Optional post-provisioning bond probe.
    pub uplink_probe: Option<UplinkProbeConfig>,
    /// Skip live CVM reconciliation (fabric-only pass).
    pub skip_cvm: bool,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).context("failed to parse config file")?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if args.ten_gig_only {
            self.use_ten_gig_only = true;
        }

        if args.skip_cvm {
            self.skip_cvm = true;
        }

        if let Some(ref marker) = args.failure_marker {
            self.paths.failure_marker = marker.clone();
        }

        self
    }

    /// Validate the raw records into the typed desired state.
    pub fn desired_state(&self) -> Result<DesiredState> {
        if self.vswitches.is_empty() {
            bail!("no vswitches declared");
        }
        for (i, vs) in self.vswitches.iter().enumerate() {
            if vs.name.is_empty() {
                bail!("vswitch at position {i} has no name");
            }
            if self.vswitches[..i].iter().any(|other| other.name == vs.name) {
                bail!("duplicate vswitch name {}", vs.name);
            }
        }

        let vswitches: Vec<VSwitchSpec> = self.vswitches.iter().map(VSwitchConfig::to_spec).collect();

        let mut host_interfaces = Vec::new();
        for iface in &self.host_interfaces {
            if !self.vswitches.iter().any(|vs| vs.name == iface.vswitch) {
                bail!(
                    "host interface {} references undeclared vswitch {}",
                    iface.name,
                    iface.vswitch
                );
            }
            host_interfaces.push(iface.to_spec());
        }

        let mut cvm_interfaces = Vec::new();
        for iface in &self.cvm_interfaces {
            if iface.vswitch != INTERNAL_VSWITCH
                && !self.vswitches.iter().any(|vs| vs.name == iface.vswitch)
            {
                bail!(
                    "CVM interface {} references undeclared vswitch {}",
                    iface.name,
                    iface.vswitch
                );
            }
            cvm_interfaces.push(iface.to_spec());
        }

        Ok(DesiredState {
            use_ten_gig_only: self.use_ten_gig_only,
            vswitches,
            host_interfaces,
            cvm_interfaces,
        })
    }
}

/// Validated desired state handed to the pipeline.
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub use_ten_gig_only: bool,
    pub vswitches: Vec<VSwitchSpec>,
    pub host_interfaces: Vec<HostInterfaceSpec>,
    pub cvm_interfaces: Vec<CvmInterfaceSpec>,
}

// An out-of-range tag never blocks assignment; it is dropped like an
// unknown bond mode.
fn check_vlan(vlan: Option<u16>, iface: &str) -> Option<u16> {
    match vlan {
        Some(tag) if tag > MAX_VLAN_ID => {
            warn!(iface, vlan = tag, "VLAN out of range, ignoring");
            None
        }
        other => other,
    }
}

/// Raw vswitch record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VSwitchConfig {
    pub name: String,
    /// Uplink matchers: interface name, MAC, or driver.
    pub uplinks: Vec<String>,
    /// Speed filter in Mbps.
    pub uplink_speeds: Vec<u32>,
    pub bond_mode: Option<String>,
    pub lacp: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// Extra `other_config:` key=value settings on the bond port.
    pub other_config: Vec<String>,
}

fn default_mtu() -> u32 {
    1500
}

impl VSwitchConfig {
    fn to_spec(&self) -> VSwitchSpec {
        // An unknown bond mode is warned about and dropped, never fatal.
        let bond_mode = self.bond_mode.as_deref().and_then(|raw| {
            match raw.parse::<BondMode>() {
                Ok(mode) => Some(mode),
                Err(unknown) => {
                    warn!(vswitch = %self.name, mode = %unknown, "unknown bond mode, ignoring");
                    None
                }
            }
        });
        VSwitchSpec {
            name: self.name.clone(),
            uplinks: self.uplinks.clone(),
            uplink_speeds: self.uplink_speeds.clone(),
            bond_mode,
            lacp: self.lacp.clone(),
            mtu: self.mtu,
            other_config: self.other_config.clone(),
        }
    }
}

/// Raw host interface record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostInterfaceConfig {
    pub name: String,
    pub vswitch: String,
    pub vlan: Option<u16>,
    pub ip: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

impl HostInterfaceConfig {
    fn to_spec(&self) -> HostInterfaceSpec {
        HostInterfaceSpec {
            name: self.name.clone(),
            vswitch: self.vswitch.clone(),
            vlan: check_vlan(self.vlan, &self.name),
            ip: self.ip,
            netmask: self.netmask,
            gateway: self.gateway,
        }
    }
}

/// Raw CVM interface record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CvmInterfaceConfig {
    pub name: String,
    pub vswitch: String,
    pub vlan: Option<u16>,
}

impl CvmInterfaceConfig {
    fn to_spec(&self) -> CvmInterfaceSpec {
        CvmInterfaceSpec {
            name: self.name.clone(),
            vswitch: self.vswitch.clone(),
            vlan: check_vlan(self.vlan, &self.name),
        }
    }
}

/// RDMA passthrough configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RdmaConfig {
    /// RDMA-capable PCI bus addresses in firmware order.
    pub bus_addresses: Vec<String>,
    /// Operator's device-name selection to pass through.
    pub selection: Vec<String>,
}

/// How to reach the CVM for MAC resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub cvm_user: String,
    pub cvm_address: String,
    pub ssh_key_path: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            cvm_user: "admin".to_string(),
            cvm_address: "192.168.5.2".to_string(),
            ssh_key_path: "/root/.ssh/id_rsa".to_string(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding persisted per-interface config entries.
    pub ifcfg_dir: String,
    /// Marker file written on fatal failure.
    pub failure_marker: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ifcfg_dir: "/etc/sysconfig/network-scripts".to_string(),
            failure_marker: "/tmp/fabricboot_failure".to_string(),
        }
    }
}

/// Post-provisioning reachability probe over a vswitch's bond.
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkProbeConfig {
    /// Vswitch whose bond is probed.
    pub vswitch: String,
    /// IP the active uplink must be able to ping.
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    const MINIMAL: &str = "
vswitches:
  - name: br0
    uplinks: [eth0, eth1]
    bond_mode: balance-slb
    mtu: 9000
host_interfaces:
  - name: br0
    vswitch: br0
cvm_interfaces:
  - name: eth0
    vswitch: br0
    vlan: 10
";

    #[test]
    fn minimal_config_validates() {
        let desired = parse(MINIMAL).desired_state().unwrap();
        assert_eq!(desired.vswitches.len(), 1);
        assert_eq!(desired.vswitches[0].mtu, 9000);
        assert_eq!(desired.vswitches[0].bond_mode, Some(BondMode::BalanceSlb));
        assert_eq!(desired.cvm_interfaces[0].vlan, Some(10));
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = parse("vswitches:\n  - name: br0\n");
        assert!(!config.use_ten_gig_only);
        assert_eq!(config.paths.ifcfg_dir, "/etc/sysconfig/network-scripts");
        assert_eq!(config.remote.cvm_address, "192.168.5.2");
        let desired = config.desired_state().unwrap();
        assert_eq!(desired.vswitches[0].mtu, 1500);
    }

    #[test]
    fn unknown_bond_mode_is_dropped_not_fatal() {
        let yaml = "
vswitches:
  - name: br0
    bond_mode: balance-rr
";
        let desired = parse(yaml).desired_state().unwrap();
        assert_eq!(desired.vswitches[0].bond_mode, None);
    }

    #[test]
    fn duplicate_vswitch_name_is_rejected() {
        let yaml = "
vswitches:
  - name: br0
  - name: br0
";
        assert!(parse(yaml).desired_state().is_err());
    }

    #[test]
    fn undeclared_vswitch_reference_is_rejected() {
        let yaml = "
vswitches:
  - name: br0
host_interfaces:
  - name: br9
    vswitch: br9
";
        assert!(parse(yaml).desired_state().is_err());
    }

    #[test]
    fn internal_cvm_interface_needs_no_vswitch() {
        let yaml = "
vswitches:
  - name: br0
cvm_interfaces:
  - name: eth1
    vswitch: _internal_
";
        let desired = parse(yaml).desired_state().unwrap();
        assert!(desired.cvm_interfaces[0].is_internal());
    }

    #[test]
    fn out_of_range_vlan_is_dropped_not_fatal() {
        let yaml = "
vswitches:
  - name: br0
host_interfaces:
  - name: br0
    vswitch: br0
    vlan: 4095
cvm_interfaces:
  - name: eth0
    vswitch: br0
    vlan: 4095
";
        let desired = parse(yaml).desired_state().unwrap();
        assert_eq!(desired.host_interfaces[0].vlan, None);
        assert_eq!(desired.cvm_interfaces[0].vlan, None);
    }

    #[test]
    fn cli_overrides_apply() {
        use clap::Parser;
        let args = crate::cli::Args::parse_from([
            "fabricboot-node",
            "--ten-gig-only",
            "--skip-cvm",
            "--failure-marker",
            "/run/marker",
        ]);
        let config = parse(MINIMAL).with_cli_overrides(&args);
        assert!(config.use_ten_gig_only);
        assert!(config.skip_cvm);
        assert_eq!(config.paths.failure_marker, "/run/marker");
    }
}
