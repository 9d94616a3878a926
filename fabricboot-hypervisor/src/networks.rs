//! Libvirt network definitions for the provisioned fabric.
//!
//! Two networks are maintained: the VM-facing bridge network that hands
//! guests a port on the primary vswitch, and the host-local management
//! network the CVM uses to talk to its host. The stock `default` NAT
//! network is removed so guests cannot land on it by accident.

use tracing::{debug, info, instrument};

use fabricboot_common::{CommandRunner, RunOpts};

use crate::error::{DomainError, Result};
use crate::virsh::stage_fragment;

/// Name of the VM-facing bridge network.
pub const VM_NETWORK: &str = "vm-network";

/// Name of the host-local management network.
pub const LOCAL_NETWORK: &str = "local-network";

/// Bridge device backing the local network.
const LOCAL_BRIDGE: &str = "virbr0";

/// Host-side address on the local network.
const LOCAL_ADDRESS: &str = "192.168.5.1";

fn vm_network_xml(bridge: &str) -> String {
    format!(
        "<network>\n\
         \x20 <name>{VM_NETWORK}</name>\n\
         \x20 <forward mode='bridge'/>\n\
         \x20 <bridge name='{bridge}'/>\n\
         \x20 <virtualport type='openvswitch'/>\n\
         </network>\n"
    )
}

fn local_network_xml() -> String {
    format!(
        "<network>\n\
         \x20 <name>{LOCAL_NETWORK}</name>\n\
         \x20 <bridge name='{LOCAL_BRIDGE}' stp='on' delay='0'/>\n\
         \x20 <ip address='{LOCAL_ADDRESS}' netmask='255.255.255.0'/>\n\
         </network>\n"
    )
}

pub struct NetworkProvisioner<'a, R> {
    runner: &'a R,
}

impl<'a, R: CommandRunner> NetworkProvisioner<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Define, start, and autostart both networks, replacing any previous
    /// definitions. `vm_bridge` is the vswitch backing the VM network.
    #[instrument(skip(self))]
    pub fn provision(&self, vm_bridge: &str) -> Result<()> {
        self.remove("default");
        self.define(VM_NETWORK, &vm_network_xml(vm_bridge))?;
        self.define(LOCAL_NETWORK, &local_network_xml())?;
        info!(vm_bridge, "libvirt networks provisioned");
        Ok(())
    }

    /// Tear down a network if it exists. Both calls are best-effort; a
    /// network that was never defined fails them and that is fine.
    fn remove(&self, name: &str) {
        let opts = RunOpts::once().quiet();
        let _ = self.runner.run(&["virsh", "net-destroy", name], &opts);
        let _ = self.runner.run(&["virsh", "net-undefine", name], &opts);
    }

    fn define(&self, name: &str, xml: &str) -> Result<()> {
        debug!(network = name, "defining libvirt network");
        self.remove(name);

        let file = stage_fragment(xml)?;
        let path = file.path().display().to_string();
        let opts = RunOpts::once();
        self.runner
            .run_checked(&["virsh", "net-define", &path], &opts)
            .map_err(|e| DomainError::NetworkFailed(e.to_string()))?;
        self.runner
            .run_checked(&["virsh", "net-start", name], &opts)
            .map_err(|e| DomainError::NetworkFailed(e.to_string()))?;
        self.runner
            .run_checked(&["virsh", "net-autostart", name], &opts)
            .map_err(|e| DomainError::NetworkFailed(e.to_string()))?;
        Ok(())
    }
}
