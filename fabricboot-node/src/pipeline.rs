//! The sequential provisioning pipeline.
//!
//! One pass per invocation, in a fixed order: expand the RDMA passthrough
//! selection, snapshot the NIC pool, partition it across the declared
//! vswitches, reconcile host interfaces, repair upstream connectivity,
//! optionally probe the bond's active uplink, define the libvirt networks,
//! and finally rewire the CVM's NIC devices. Earlier stages stay applied
//! when a later stage fails; there is no cross-stage rollback.

use anyhow::{bail, Context, Result};
use tracing::{info, instrument};

use fabricboot_common::ShellRunner;
use fabricboot_hypervisor::{
    LiveDomainReconciler, NetworkProvisioner, SshMacResolver, VirshDomain, LOCAL_NETWORK,
};
use fabricboot_net::{
    plan_passthrough, ActiveUplinkSelector, DirIfcfgStore, HostInterfaceReconciler,
    NicInventoryProvider, SysfsInventory, VSwitchProvisioner,
};

use crate::config::Config;

#[instrument(skip_all)]
pub fn run(config: &Config) -> Result<()> {
    let desired = config.desired_state().context("validating desired state")?;
    let runner = ShellRunner::new();
    let inventory = SysfsInventory::new(&runner);

    // Expand the passthrough selection against the full inventory first, so
    // the passed-through cards never enter the vswitch pool.
    let all_nics = inventory.snapshot(&[]).context("NIC inventory")?;
    let plan = plan_passthrough(&config.rdma.selection, &config.rdma.bus_addresses, &all_nics)
        .context("RDMA passthrough planning")?;
    if !plan.names.is_empty() {
        info!(devices = ?plan.names, "excluding passthrough NICs from the pool");
    }

    let pool = inventory
        .snapshot(&plan.bus_addrs)
        .context("NIC inventory")?;
    info!(nics = pool.len(), "NIC pool ready");

    let ifcfg = DirIfcfgStore::new(&config.paths.ifcfg_dir);
    let assignment = VSwitchProvisioner::new(&runner, &ifcfg)
        .provision(&desired.vswitches, pool, desired.use_ten_gig_only)
        .context("vswitch provisioning")?;

    let reconciler = HostInterfaceReconciler::new(&runner, &ifcfg);
    reconciler
        .reconcile(&desired.host_interfaces, &assignment)
        .context("host interface reconciliation")?;
    reconciler
        .repair_connectivity(&desired.host_interfaces)
        .context("connectivity repair")?;

    if let Some(probe) = &config.uplink_probe {
        let vswitch = desired
            .vswitches
            .iter()
            .find(|vs| vs.name == probe.vswitch);
        let Some(vswitch) = vswitch else {
            bail!("uplink probe references undeclared vswitch {}", probe.vswitch);
        };
        // A single-uplink switch has a plain port, not a bond.
        let members = assignment.uplinks_for(&vswitch.name).unwrap_or(&[]);
        if members.len() > 1 {
            let active = ActiveUplinkSelector::new(&runner)
                .select(&vswitch.bond_name(), &probe.target)
                .context("active uplink selection")?;
            info!(bond = %vswitch.bond_name(), active = %active, "active uplink selected");
        } else {
            info!(vswitch = %vswitch.name, "single uplink, skipping bond probe");
        }
    }

    let vm_bridge = &desired.vswitches[0].name;
    NetworkProvisioner::new(&runner)
        .provision(vm_bridge)
        .context("libvirt network provisioning")?;

    if config.skip_cvm {
        info!("skipping CVM reconciliation");
        return Ok(());
    }

    let domain = VirshDomain::find(&runner).context("locating CVM domain")?;
    let resolver = SshMacResolver::new(
        &runner,
        &config.remote.cvm_user,
        &config.remote.cvm_address,
        &config.remote.ssh_key_path,
    );
    let vswitch_names: Vec<String> = desired.vswitches.iter().map(|vs| vs.name.clone()).collect();
    let report = LiveDomainReconciler::new(&domain, &resolver, vswitch_names, LOCAL_NETWORK)
        .reconcile(&desired.cvm_interfaces)
        .context("CVM reconciliation")?;
    info!(
        updated = report.updated,
        unchanged = report.unchanged,
        "CVM reconciliation complete"
    );

    Ok(())
}
