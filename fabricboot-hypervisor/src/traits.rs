//! Seams between the reconciliation logic and the hypervisor backend.

use fabricboot_common::MacAddr;

use crate::error::Result;

/// Handle to a live VM domain.
///
/// The production implementation shells out to `virsh`; tests substitute an
/// in-memory domain.
pub trait DomainHandle {
    /// Domain name as known to the hypervisor.
    fn name(&self) -> &str;

    /// Fetch the current live domain descriptor XML.
    fn descriptor(&self) -> Result<String>;

    /// Detach a device, identified by its exact XML fragment from the
    /// descriptor. Applies to the live domain and its persistent config.
    fn detach_device(&self, device_xml: &str) -> Result<()>;

    /// Attach a device described by the given XML fragment. Applies to the
    /// live domain and its persistent config.
    fn attach_device(&self, device_xml: &str) -> Result<()>;
}

/// Resolves a guest-side interface name to the MAC address it carries.
///
/// Interface names inside the guest are the only stable identifiers the
/// desired state speaks; the MAC is what binds them to live devices.
pub trait MacResolver {
    fn resolve_mac(&self, iface: &str) -> Result<MacAddr>;
}
