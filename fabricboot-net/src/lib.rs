//! # fabricboot Net
//!
//! Physical network fabric provisioning for a hypervisor node's first boot:
//! NIC inventory modelling, uplink matching, virtual switch creation,
//! host-facing interface reconciliation, and RDMA passthrough planning.
//!
//! The pipeline is strictly sequential: one shared NIC pool is partitioned
//! across the declared virtual switches in declaration order, each switch is
//! wired with a single atomic `ovs-vsctl` transaction, and host interfaces
//! are reloaded together only once every switch has been declared.

pub mod bond;
pub mod error;
pub mod hostif;
pub mod ifcfg;
pub mod inventory;
pub mod rdma;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod uplink;
pub mod vswitch;

pub use bond::ActiveUplinkSelector;
pub use error::NetworkError;
pub use hostif::HostInterfaceReconciler;
pub use ifcfg::{DirIfcfgStore, IfcfgStore};
pub use inventory::{NicInventoryProvider, SysfsInventory};
pub use rdma::{plan_passthrough, PassthroughPlan};
pub use types::{
    Assignment, BondMode, HostInterfaceSpec, NicRecord, VSwitchSpec,
    DEFAULT_UPLINK_DRIVERS, TEN_GIG_DRIVERS,
};
pub use vswitch::VSwitchProvisioner;
