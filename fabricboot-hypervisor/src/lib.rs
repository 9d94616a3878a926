//! # fabricboot Hypervisor
//!
//! Live CVM reconciliation: reattaches the management VM's virtual NIC
//! devices to the bridges and VLANs declared in desired state. Devices are
//! bound by MAC address only; CVM-assigned interface names are unstable
//! across boots and never trusted. Existing devices are rewired in place via
//! detach/attach pairs; no device is ever fabricated.

pub mod device_xml;
pub mod error;
pub mod mock;
pub mod networks;
pub mod reconciler;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod types;
pub mod virsh;

pub use device_xml::{parse_interfaces, InterfaceXmlBuilder};
pub use error::DomainError;
pub use mock::{MockDomain, StaticMacResolver};
pub use networks::{NetworkProvisioner, LOCAL_NETWORK, VM_NETWORK};
pub use reconciler::{LiveDomainReconciler, ReconcileReport};
pub use traits::{DomainHandle, MacResolver};
pub use types::{CvmInterfaceSpec, DeviceSource, DomainNicDevice, INTERNAL_VSWITCH};
pub use virsh::{SshMacResolver, VirshDomain};
