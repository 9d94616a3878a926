//! RDMA passthrough planner.
//!
//! Only whole physical cards can be passed through to the CVM. RDMA-capable
//! ports come in firmware order with both ports of a dual-port card at
//! adjacent indices, so each selected device is expanded to include its
//! physical-card sibling: an even index pairs with index+1, an odd index
//! with index-1.

use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::types::NicRecord;

/// Expanded passthrough selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughPlan {
    /// Device names, selection first, siblings as encountered, deduplicated.
    pub names: Vec<String>,
    /// PCI bus addresses of `names`, used to exclude the devices from the
    /// vswitch NIC pool.
    pub bus_addrs: Vec<String>,
}

/// Expand the operator's device selection to whole physical cards.
pub fn plan_passthrough(
    selection: &[String],
    rdma_bus_addrs: &[String],
    nics: &[NicRecord],
) -> Result<PassthroughPlan> {
    let mut names: Vec<String> = Vec::new();
    let push = |name: &str, names: &mut Vec<String>| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    for selected in selection {
        let nic = nics
            .iter()
            .find(|nic| &nic.name == selected)
            .ok_or_else(|| {
                NetworkError::InvalidConfig(format!("selected RDMA device {selected} not found"))
            })?;
        let index = rdma_bus_addrs
            .iter()
            .position(|addr| *addr == nic.pci_addr)
            .ok_or_else(|| {
                NetworkError::InvalidConfig(format!(
                    "device {selected} ({}) is not RDMA capable",
                    nic.pci_addr
                ))
            })?;

        let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
        let sibling_addr = rdma_bus_addrs.get(sibling_index).ok_or_else(|| {
            NetworkError::InvalidConfig(format!(
                "RDMA device {selected} has no card sibling at index {sibling_index}"
            ))
        })?;
        let sibling = nics
            .iter()
            .find(|nic| &nic.pci_addr == sibling_addr)
            .ok_or_else(|| {
                NetworkError::InvalidConfig(format!(
                    "no netdev found for RDMA sibling {sibling_addr}"
                ))
            })?;

        debug!(selected = %selected, sibling = %sibling.name, "expanding RDMA selection to whole card");
        push(selected, &mut names);
        push(&sibling.name, &mut names);
    }

    let bus_addrs = names
        .iter()
        .map(|name| {
            nics.iter()
                .find(|nic| &nic.name == name)
                .map(|nic| nic.pci_addr.clone())
                .unwrap_or_default()
        })
        .collect();

    Ok(PassthroughPlan { names, bus_addrs })
}
