//! Virtual switch provisioner.
//!
//! Processes the declared vswitches in order against one shared NIC pool.
//! Each spec's matched NICs are removed from the pool before the next spec
//! runs, so earlier specs claim first; this greedy, order-dependent
//! partition is the load-bearing sequencing invariant of the whole pipeline.
//!
//! Per switch, all `ovs-vsctl` subcommands are submitted as a single
//! transaction. A failure inside the transaction aborts that switch's whole
//! wiring; no partial-apply handling is attempted here, and switches already
//! wired by earlier specs stay wired.

use tracing::{info, instrument, warn};

use fabricboot_common::{CommandRunner, RunOpts};

use crate::error::{NetworkError, Result};
use crate::ifcfg::IfcfgStore;
use crate::types::{sort_by_speed, Assignment, NicRecord, VSwitchSpec, TEN_GIG_DRIVERS};
use crate::uplink::resolve_uplinks;

pub struct VSwitchProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    ifcfg: &'a dyn IfcfgStore,
}

impl<'a> VSwitchProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ifcfg: &'a dyn IfcfgStore) -> Self {
        Self { runner, ifcfg }
    }

    /// Partition the pool across the declared vswitches and wire each one.
    ///
    /// Returns the assignment of uplinks per vswitch, used later for the
    /// host-interface dependency markers.
    #[instrument(skip_all, fields(vswitches = specs.len(), pool = pool.len()))]
    pub fn provision(
        &self,
        specs: &[VSwitchSpec],
        mut pool: Vec<NicRecord>,
        use_ten_gig_only: bool,
    ) -> Result<Assignment> {
        for (i, vs) in specs.iter().enumerate() {
            if specs[..i].iter().any(|other| other.name == vs.name) {
                return Err(NetworkError::InvalidConfig(format!(
                    "duplicate vswitch name {}",
                    vs.name
                )));
            }
        }

        sort_by_speed(&mut pool);

        let mut specs: Vec<VSwitchSpec> = specs.to_vec();

        // A matcherless sole spec absorbs the whole pool, optionally
        // restricted to ten-gig drivers.
        if specs.len() == 1 && specs[0].uplinks.is_empty() {
            if use_ten_gig_only {
                pool.retain(|nic| TEN_GIG_DRIVERS.contains(&nic.driver.as_str()));
            }
            specs[0].uplinks = pool.iter().map(|nic| nic.name.clone()).collect();
        }

        let original_names: Vec<String> = pool.iter().map(|nic| nic.name.clone()).collect();
        let mut assignment = Assignment::default();

        for vs in &specs {
            if pool.is_empty() {
                return Err(NetworkError::PoolExhausted(vs.name.clone()));
            }

            let result = resolve_uplinks(vs, pool)?;
            let matched = result.matched;
            pool = result.remaining;

            let uplink_names: Vec<String> =
                matched.iter().map(|nic| nic.name.clone()).collect();
            info!(vswitch = %vs.name, uplinks = ?uplink_names, "assigning uplinks to vswitch");

            // Persist the MTU on each physical uplink and cycle its link so
            // the new MTU takes, before the switch transaction goes in.
            for nic in &matched {
                self.ifcfg.append(&nic.name, "MTU", &vs.mtu.to_string())?;
                self.cycle_link(&nic.name);
            }

            let recorded = if uplink_names.is_empty() {
                // A filterless matcher found nothing; bond every NIC from
                // the original unfiltered inventory instead.
                warn!(
                    vswitch = %vs.name,
                    "no desired uplinks found, bonding all NICs from original inventory"
                );
                original_names.clone()
            } else {
                uplink_names
            };

            self.submit_transaction(&self.build_transaction(vs, &recorded))?;
            assignment.record(&vs.name, recorded);
        }

        Ok(assignment)
    }

    /// Build the ordered subcommand list for one switch.
    fn build_transaction(&self, vs: &VSwitchSpec, uplinks: &[String]) -> Vec<Vec<String>> {
        let bond = vs.bond_name();
        let mut cmds: Vec<Vec<String>> = vec![vec!["add-br".into(), vs.name.clone()]];

        if uplinks.len() > 1 {
            let mut cmd = vec!["add-bond".into(), vs.name.clone(), bond.clone()];
            cmd.extend(uplinks.iter().cloned());
            cmds.push(cmd);
        } else if let [only] = uplinks {
            cmds.push(vec!["add-port".into(), vs.name.clone(), only.clone()]);
        }

        if let Some(lacp) = &vs.lacp {
            cmds.push(vec![
                "set".into(),
                "port".into(),
                bond.clone(),
                format!("lacp={lacp}"),
            ]);
        }

        if uplinks.len() != 1 {
            if let Some(mode) = vs.bond_mode {
                cmds.push(vec![
                    "set".into(),
                    "port".into(),
                    bond.clone(),
                    format!("bond_mode={mode}"),
                ]);
            }
        }

        for setting in &vs.other_config {
            cmds.push(vec![
                "set".into(),
                "port".into(),
                bond.clone(),
                format!("other_config:{setting}"),
            ]);
        }

        cmds
    }

    /// Submit all subcommands as one atomic `ovs-vsctl` call.
    fn submit_transaction(&self, cmds: &[Vec<String>]) -> Result<()> {
        let mut argv: Vec<&str> = vec!["ovs-vsctl"];
        for (i, cmd) in cmds.iter().enumerate() {
            if i > 0 {
                argv.push("--");
            }
            argv.extend(cmd.iter().map(String::as_str));
        }
        self.runner.run_checked(&argv, &RunOpts::once())?;
        Ok(())
    }

    fn cycle_link(&self, dev: &str) {
        let opts = RunOpts::once();
        let _ = self.runner.run(&["/sbin/ifdown", dev], &opts);
        let _ = self.runner.run(&["/sbin/ifup", dev], &opts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemIfcfgStore, RecordingRunner};
    use crate::types::{test_nic, BondMode};

    fn vs(name: &str, uplinks: &[&str]) -> VSwitchSpec {
        VSwitchSpec {
            name: name.to_string(),
            uplinks: uplinks.iter().map(|s| s.to_string()).collect(),
            uplink_speeds: Vec::new(),
            bond_mode: None,
            lacp: None,
            mtu: 1500,
            other_config: Vec::new(),
        }
    }

    fn pool() -> Vec<NicRecord> {
        vec![
            test_nic("eth0", "00:00:00:00:00:01", "ixgbe", &[10000]),
            test_nic("eth1", "00:00:00:00:00:02", "ixgbe", &[10000]),
            test_nic("eth2", "00:00:00:00:00:03", "igb", &[1000]),
            test_nic("eth3", "00:00:00:00:00:04", "igb", &[1000]),
        ]
    }

    #[test]
    fn assignment_partitions_the_pool() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &["ixgbe"]), vs("br1", &["igb"])];
        let assignment = prov.provision(&specs, pool(), false).unwrap();

        let br0: Vec<&String> = assignment.uplinks_for("br0").unwrap().iter().collect();
        let br1: Vec<&String> = assignment.uplinks_for("br1").unwrap().iter().collect();
        assert_eq!(br0, ["eth0", "eth1"]);
        assert_eq!(br1, ["eth2", "eth3"]);

        // Partition property: no NIC appears twice across vswitches.
        let mut all = assignment.all_uplinks();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn earlier_specs_claim_first() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        // Both specs list ixgbe; br0 is declared first and takes both ixgbe
        // NICs, leaving br1 only the igb leftovers.
        let specs = vec![vs("br0", &["ixgbe"]), vs("br1", &["ixgbe", "igb"])];
        let assignment = prov.provision(&specs, pool(), false).unwrap();
        assert_eq!(assignment.uplinks_for("br0").unwrap().len(), 2);
        let br1 = assignment.uplinks_for("br1").unwrap();
        assert_eq!(br1, &["eth2".to_string(), "eth3".to_string()][..]);
    }

    #[test]
    fn empty_pool_for_a_spec_is_fatal() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &["ixgbe", "igb"]), vs("br1", &["igb"])];
        let err = prov.provision(&specs, pool(), false).unwrap_err();
        assert!(matches!(err, NetworkError::PoolExhausted(name) if name == "br1"));
    }

    #[test]
    fn sole_matcherless_spec_absorbs_pool() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &[])];
        let assignment = prov.provision(&specs, pool(), false).unwrap();
        assert_eq!(assignment.uplinks_for("br0").unwrap().len(), 4);
    }

    #[test]
    fn ten_gig_only_restricts_absorbed_pool() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &[])];
        let assignment = prov.provision(&specs, pool(), true).unwrap();
        let uplinks = assignment.uplinks_for("br0").unwrap();
        assert_eq!(uplinks, &["eth0".to_string(), "eth1".to_string()][..]);
    }

    #[test]
    fn multi_uplink_switch_gets_a_bond() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let mut spec = vs("br0", &["ixgbe"]);
        spec.bond_mode = Some(BondMode::BalanceSlb);
        spec.lacp = Some("active".to_string());
        spec.other_config = vec!["lacp-time=fast".to_string()];
        prov.provision(&[spec], pool(), false).unwrap();

        let vsctl = runner.calls_starting_with("ovs-vsctl");
        assert_eq!(vsctl.len(), 1);
        assert_eq!(
            vsctl[0],
            "ovs-vsctl add-br br0 -- add-bond br0 br0-up eth0 eth1 \
             -- set port br0-up lacp=active \
             -- set port br0-up bond_mode=balance-slb \
             -- set port br0-up other_config:lacp-time=fast"
        );
    }

    #[test]
    fn single_uplink_switch_gets_a_port_and_no_bond_mode() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let mut spec = vs("br0", &["eth0"]);
        spec.bond_mode = Some(BondMode::ActiveBackup);
        prov.provision(&[spec], pool(), false).unwrap();

        let vsctl = runner.calls_starting_with("ovs-vsctl");
        assert_eq!(vsctl, ["ovs-vsctl add-br br0 -- add-port br0 eth0"]);
    }

    #[test]
    fn filterless_matcher_with_no_match_bonds_original_inventory() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &["bnxt_en"])];
        let assignment = prov.provision(&specs, pool(), false).unwrap();

        // All four NICs from the original inventory back the fallback bond.
        assert_eq!(assignment.uplinks_for("br0").unwrap().len(), 4);
        let vsctl = runner.calls_starting_with("ovs-vsctl");
        assert!(vsctl[0].contains("add-bond br0 br0-up"));
    }

    #[test]
    fn mtu_is_persisted_and_links_cycled_before_transaction() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let mut spec = vs("br0", &["eth0"]);
        spec.mtu = 9000;
        prov.provision(&[spec], pool(), false).unwrap();

        assert_eq!(
            store.entries_for("eth0"),
            [("MTU".to_string(), "9000".to_string())]
        );
        let calls = runner.calls();
        let ifup = calls.iter().position(|c| c == "/sbin/ifup eth0").unwrap();
        let vsctl = calls.iter().position(|c| c.starts_with("ovs-vsctl")).unwrap();
        assert!(ifup < vsctl, "link cycle must precede the transaction");
    }

    #[test]
    fn duplicate_vswitch_names_are_rejected() {
        let runner = RecordingRunner::default();
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &["ixgbe"]), vs("br0", &["igb"])];
        assert!(matches!(
            prov.provision(&specs, pool(), false),
            Err(NetworkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn failed_transaction_aborts_that_switch() {
        let runner = RecordingRunner::default();
        runner.fail("ovs-vsctl");
        let store = MemIfcfgStore::default();
        let prov = VSwitchProvisioner::new(&runner, &store);

        let specs = vec![vs("br0", &["ixgbe"])];
        assert!(matches!(
            prov.provision(&specs, pool(), false),
            Err(NetworkError::Command(_))
        ));
    }
}
