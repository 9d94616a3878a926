//! `virsh`- and SSH-backed production implementations of the domain seams.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use fabricboot_common::{CommandRunner, MacAddr, RunOpts};

use crate::error::{DomainError, Result};
use crate::traits::{DomainHandle, MacResolver};

/// Suffix by which the management VM's domain is recognized.
const CVM_NAME_SUFFIX: &str = "-CVM";

/// Live domain handle backed by the `virsh` CLI.
pub struct VirshDomain<'a, R> {
    runner: &'a R,
    name: String,
}

impl<'a, R: CommandRunner> VirshDomain<'a, R> {
    /// Locate the CVM domain by its naming convention.
    #[instrument(skip_all)]
    pub fn find(runner: &'a R) -> Result<Self> {
        let out = runner.run_checked(&["virsh", "list", "--all", "--name"], &RunOpts::probe())?;
        let name = out
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| line.ends_with(CVM_NAME_SUFFIX))
            .ok_or(DomainError::CvmNotFound)?
            .to_string();
        debug!(domain = %name, "found CVM domain");
        Ok(Self { runner, name })
    }

    /// Wrap a domain already known by name.
    pub fn named(runner: &'a R, name: &str) -> Self {
        Self {
            runner,
            name: name.to_string(),
        }
    }

    fn device_call(&self, verb: &str, device_xml: &str) -> Result<String> {
        let file = stage_fragment(device_xml)?;
        let path = file.path().display().to_string();
        let out = self
            .runner
            .run_checked(
                &["virsh", verb, &self.name, &path, "--live", "--config"],
                &RunOpts::once().with_timeout(Duration::from_secs(60)),
            )
            .map_err(|e| match verb {
                "detach-device" => DomainError::DetachFailed(e.to_string()),
                _ => DomainError::AttachFailed(e.to_string()),
            })?;
        Ok(out.stdout)
    }
}

impl<R: CommandRunner> DomainHandle for VirshDomain<'_, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Result<String> {
        let out = self
            .runner
            .run_checked(&["virsh", "dumpxml", &self.name], &RunOpts::probe())
            .map_err(|e| DomainError::DescriptorFailed(e.to_string()))?;
        Ok(out.stdout)
    }

    fn detach_device(&self, device_xml: &str) -> Result<()> {
        info!(domain = %self.name, "detaching NIC device");
        self.device_call("detach-device", device_xml)?;
        Ok(())
    }

    fn attach_device(&self, device_xml: &str) -> Result<()> {
        info!(domain = %self.name, "attaching NIC device");
        self.device_call("attach-device", device_xml)?;
        Ok(())
    }
}

/// Write an XML fragment to a temp file virsh can read. The file is deleted
/// when the handle drops, so callers must keep it alive across the call.
pub(crate) fn stage_fragment(xml: &str) -> Result<NamedTempFile> {
    let mut file =
        NamedTempFile::new().map_err(|e| DomainError::Xml(format!("staging fragment: {e}")))?;
    file.write_all(xml.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| DomainError::Xml(format!("staging fragment: {e}")))?;
    Ok(file)
}

/// Resolves guest interface MACs over SSH into the CVM.
pub struct SshMacResolver<'a, R> {
    runner: &'a R,
    target: String,
    key_path: String,
}

impl<'a, R: CommandRunner> SshMacResolver<'a, R> {
    pub fn new(runner: &'a R, user: &str, host: &str, key_path: &str) -> Self {
        Self {
            runner,
            target: format!("{user}@{host}"),
            key_path: key_path.to_string(),
        }
    }
}

impl<R: CommandRunner> MacResolver for SshMacResolver<'_, R> {
    fn resolve_mac(&self, iface: &str) -> Result<MacAddr> {
        let remote = format!("cat /sys/class/net/{iface}/address");
        let argv = [
            "ssh",
            "-i",
            &self.key_path,
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "ConnectTimeout=10",
            &self.target,
            &remote,
        ];
        let out = self
            .runner
            .run_checked(&argv, &RunOpts::probe().with_timeout(Duration::from_secs(30)))
            .map_err(|_| DomainError::MacResolveFailed(iface.to_string()))?;
        out.stdout
            .trim()
            .parse()
            .map_err(|_| DomainError::MacResolveFailed(iface.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn find_picks_the_domain_with_the_cvm_suffix() {
        let runner = ScriptedRunner::default();
        runner.respond_stdout("virsh list --all --name", "guest-a\nnode7-CVM\nguest-b\n");
        let domain = VirshDomain::find(&runner).unwrap();
        assert_eq!(domain.name(), "node7-CVM");
    }

    #[test]
    fn find_fails_when_no_cvm_exists() {
        let runner = ScriptedRunner::default();
        runner.respond_stdout("virsh list --all --name", "guest-a\nguest-b\n");
        assert!(matches!(
            VirshDomain::find(&runner),
            Err(DomainError::CvmNotFound)
        ));
    }

    #[test]
    fn detach_goes_through_a_staged_file_with_live_and_config() {
        let runner = ScriptedRunner::default();
        let domain = VirshDomain::named(&runner, "node7-CVM");
        domain.detach_device("<interface/>").unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("virsh detach-device node7-CVM "));
        assert!(calls[0].ends_with("--live --config"));
    }

    #[test]
    fn failed_attach_maps_to_attach_error() {
        let runner = ScriptedRunner::default();
        runner.fail("virsh attach-device");
        let domain = VirshDomain::named(&runner, "node7-CVM");
        assert!(matches!(
            domain.attach_device("<interface/>"),
            Err(DomainError::AttachFailed(_))
        ));
    }

    #[test]
    fn ssh_resolver_parses_and_normalizes_the_mac() {
        let runner = ScriptedRunner::default();
        runner.respond_stdout("ssh", "52:54:00:AB:CD:EF\n");
        let resolver = SshMacResolver::new(&runner, "admin", "192.168.5.2", "/root/.ssh/id_rsa");
        let mac = resolver.resolve_mac("eth0").unwrap();
        assert_eq!(mac.as_str(), "52:54:00:ab:cd:ef");

        let calls = runner.calls();
        assert!(calls[0].contains("admin@192.168.5.2"));
        assert!(calls[0].contains("cat /sys/class/net/eth0/address"));
    }

    #[test]
    fn garbage_mac_output_is_a_resolve_failure() {
        let runner = ScriptedRunner::default();
        runner.respond_stdout("ssh", "No such file or directory");
        let resolver = SshMacResolver::new(&runner, "admin", "192.168.5.2", "/root/.ssh/id_rsa");
        assert!(matches!(
            resolver.resolve_mac("eth9"),
            Err(DomainError::MacResolveFailed(_))
        ));
    }
}
