//! Bond active-uplink selection.
//!
//! After rewiring, an active-backup bond may have picked a member whose
//! upstream port cannot actually reach anything. Walk the members fastest
//! first, force each active in turn, and keep the first one that can ping
//! the probe target.

use std::path::PathBuf;

use tracing::{info, instrument};

use fabricboot_common::{CommandRunner, RunOpts};

use crate::error::{NetworkError, Result};

pub struct ActiveUplinkSelector<'a> {
    runner: &'a dyn CommandRunner,
    sysfs_net: PathBuf,
}

impl<'a> ActiveUplinkSelector<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            sysfs_net: PathBuf::from("/sys/class/net"),
        }
    }

    /// Override the sysfs root; used by tests.
    pub fn with_sysfs_net(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_net = root.into();
        self
    }

    /// Set the bond's active member to one that can reach `target_ip`.
    ///
    /// Returns the chosen member name. No reachable member is fatal.
    #[instrument(skip(self))]
    pub fn select(&self, bond_name: &str, target_ip: &str) -> Result<String> {
        let out = self
            .runner
            .run_checked(&["ovs-appctl", "bond/list"], &RunOpts::once())?;

        // Output form:
        //   bond    type    recircID    slaves
        //   br0-up  active-backup  0    eth1, eth0
        let mut members: Vec<(String, i64)> = Vec::new();
        for line in out.stdout.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.first() != Some(&bond_name) {
                continue;
            }
            for word in words.iter().skip(3) {
                let member = word.trim_end_matches(',').to_string();
                let speed = self.current_speed(&member);
                members.push((member, speed));
            }
            break;
        }
        members.sort_by(|a, b| b.1.cmp(&a.1));

        for (member, speed) in &members {
            if *speed <= 0 {
                continue;
            }
            let set = self.runner.run(
                &["ovs-appctl", "bond/set-active-slave", bond_name, member],
                &RunOpts::once(),
            )?;
            if !set.success() {
                info!(bond = %bond_name, member = %member, "failed to set active member");
                continue;
            }
            let probe = RunOpts::probe().with_timeout(std::time::Duration::from_secs(60));
            let ping = self
                .runner
                .run(&["ping", "-c", "1", target_ip], &probe)?;
            if ping.success() {
                info!(bond = %bond_name, member = %member, "using member as active uplink");
                return Ok(member.clone());
            }
        }

        Err(NetworkError::NoReachableUplink {
            bond: bond_name.to_string(),
            target: target_ip.to_string(),
        })
    }

    /// Current negotiated speed from sysfs; -1 when unreadable (link down).
    fn current_speed(&self, member: &str) -> i64 {
        std::fs::read_to_string(self.sysfs_net.join(member).join("speed"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(-1)
    }
}
