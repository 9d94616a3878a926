//! Rewires the CVM's live NIC devices to match declared desired state.
//!
//! Every declared interface is resolved to a MAC address inside the CVM and
//! bound to the live device carrying that MAC. A device already on the right
//! bridge with the right VLAN tag is left untouched; anything else is
//! detached using its original XML fragment and reattached with a normalized
//! one. Devices are never created here, only rewired.

use tracing::{debug, info, instrument, warn};

use crate::device_xml::{parse_interfaces, InterfaceXmlBuilder};
use crate::error::{DomainError, Result};
use crate::traits::{DomainHandle, MacResolver};
use crate::types::{CvmInterfaceSpec, DeviceSource, DomainNicDevice};

/// Outcome of a reconcile pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Devices rewritten via detach/attach.
    pub updated: usize,
    /// Devices that already matched desired state.
    pub unchanged: usize,
}

pub struct LiveDomainReconciler<'a, D, M> {
    domain: &'a D,
    resolver: &'a M,
    /// Bridge names managed by this tool; devices on other bridges are not
    /// candidates for rewiring.
    vswitch_names: Vec<String>,
    /// Name of the host-local libvirt network; devices on it are left alone.
    local_network: String,
}

impl<'a, D: DomainHandle, M: MacResolver> LiveDomainReconciler<'a, D, M> {
    pub fn new(
        domain: &'a D,
        resolver: &'a M,
        vswitch_names: Vec<String>,
        local_network: &str,
    ) -> Self {
        Self {
            domain,
            resolver,
            vswitch_names,
            local_network: local_network.to_string(),
        }
    }

    fn is_candidate(&self, device: &DomainNicDevice) -> bool {
        match &device.source {
            DeviceSource::Bridge(bridge) => self.vswitch_names.iter().any(|v| v == bridge),
            DeviceSource::Network(network) => *network != self.local_network,
            DeviceSource::Other => false,
        }
    }

    fn matches_spec(device: &DomainNicDevice, spec: &CvmInterfaceSpec) -> bool {
        device.if_type == "bridge"
            && device.source == DeviceSource::Bridge(spec.vswitch.clone())
            && device.virtualport.as_deref() == Some("openvswitch")
            && device.vlan == spec.vlan
    }

    /// Reconcile all declared interfaces against the live domain.
    ///
    /// Fails fast on the first interface whose MAC has no live device. A
    /// failed attach after a successful detach leaves the device detached;
    /// no rollback is attempted.
    #[instrument(skip_all, fields(domain = %self.domain.name()))]
    pub fn reconcile(&self, specs: &[CvmInterfaceSpec]) -> Result<ReconcileReport> {
        let descriptor = self.domain.descriptor()?;
        let devices = parse_interfaces(&descriptor)?;
        let candidates: Vec<&DomainNicDevice> =
            devices.iter().filter(|d| self.is_candidate(d)).collect();
        debug!(
            total = devices.len(),
            candidates = candidates.len(),
            "parsed NIC devices from domain descriptor"
        );

        let mut report = ReconcileReport::default();
        for spec in specs {
            if spec.is_internal() {
                debug!(iface = %spec.name, "interface rides the internal network, skipping");
                continue;
            }
            let mac = self.resolver.resolve_mac(&spec.name)?;
            let device = candidates
                .iter()
                .find(|d| d.mac == mac)
                .ok_or_else(|| DomainError::DeviceNotFound {
                    iface: spec.name.clone(),
                    mac: mac.to_string(),
                })?;

            if Self::matches_spec(device, spec) {
                debug!(iface = %spec.name, vswitch = %spec.vswitch, "device already matches desired state");
                report.unchanged += 1;
                continue;
            }

            info!(
                iface = %spec.name,
                mac = %mac,
                vswitch = %spec.vswitch,
                vlan = ?spec.vlan,
                "rewiring CVM NIC device"
            );
            self.domain.detach_device(&device.raw_xml)?;
            let new_xml = InterfaceXmlBuilder::new(&spec.vswitch, mac)
                .vlan(spec.vlan)
                .model(device.model.clone())
                .build();
            self.domain.attach_device(&new_xml)?;
            report.updated += 1;
        }

        if report.updated == 0 {
            debug!("all CVM NIC devices already matched desired state");
        } else {
            warn!(updated = report.updated, "CVM NIC devices were rewired");
        }
        Ok(report)
    }
}
