//! Data model for CVM NIC reconciliation.

use serde::{Deserialize, Serialize};

use fabricboot_common::MacAddr;

/// Sentinel vswitch name marking a CVM interface that rides the internal
/// host-local network and must not be rewired.
pub const INTERNAL_VSWITCH: &str = "_internal_";

/// Declared CVM-visible network interface.
///
/// The `name` is only used to resolve the interface's MAC inside the CVM;
/// the live device is then bound by that MAC, never by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvmInterfaceSpec {
    /// Interface name inside the CVM, e.g. `eth0`.
    pub name: String,
    /// Target vswitch (bridge) for the device.
    pub vswitch: String,
    /// Optional 802.1Q tag (0..=4094).
    pub vlan: Option<u16>,
}

impl CvmInterfaceSpec {
    /// Whether this interface rides the internal network and is skipped.
    pub fn is_internal(&self) -> bool {
        self.vswitch == INTERNAL_VSWITCH
    }
}

/// Where a live NIC device is currently plugged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    /// `<interface type='bridge'>` with a `<source bridge='..'/>`.
    Bridge(String),
    /// `<interface type='network'>` with a `<source network='..'/>`.
    Network(String),
    /// Anything else (hostdev, direct, missing source).
    Other,
}

impl Default for DeviceSource {
    fn default() -> Self {
        DeviceSource::Other
    }
}

/// One `<interface>` device parsed out of the live domain descriptor.
#[derive(Debug, Clone)]
pub struct DomainNicDevice {
    /// The `type` attribute of the interface element.
    pub if_type: String,
    pub source: DeviceSource,
    pub mac: MacAddr,
    /// Current 802.1Q tag, if any.
    pub vlan: Option<u16>,
    /// The `type` of the virtualport element, if any.
    pub virtualport: Option<String>,
    /// Device model (e.g. `virtio`), preserved across the rewrite.
    pub model: Option<String>,
    /// The raw XML fragment as it appears in the descriptor; used verbatim
    /// for the detach call.
    pub raw_xml: String,
}
