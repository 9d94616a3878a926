//! Persisted per-interface configuration store.
//!
//! Provisioning records two kinds of durable state per interface: the MTU of
//! each physical uplink and the `OVSREQUIRES` dependency marker naming the
//! uplinks a logical interface relies on. On the node this is the
//! `ifcfg-<name>` file family; tests use a directory-backed store under a
//! tempdir.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{NetworkError, Result};

/// Seam over the persisted interface-configuration files.
pub trait IfcfgStore {
    /// Append one `KEY=value` entry to the interface's config.
    fn append(&self, iface: &str, key: &str, value: &str) -> Result<()>;

    /// Parse the interface's config into a key/value map. A missing file
    /// yields an empty map. Surrounding quotes on values are stripped.
    fn read(&self, iface: &str) -> Result<HashMap<String, String>>;
}

/// Directory of `ifcfg-<name>` files, normally
/// `/etc/sysconfig/network-scripts`.
#[derive(Debug, Clone)]
pub struct DirIfcfgStore {
    root: PathBuf,
}

impl DirIfcfgStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, iface: &str) -> PathBuf {
        self.root.join(format!("ifcfg-{iface}"))
    }
}

impl IfcfgStore for DirIfcfgStore {
    fn append(&self, iface: &str, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(iface);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| NetworkError::Ifcfg {
                iface: iface.to_string(),
                source,
            })?;
        writeln!(file, "{key}={value}").map_err(|source| NetworkError::Ifcfg {
            iface: iface.to_string(),
            source,
        })
    }

    fn read(&self, iface: &str) -> Result<HashMap<String, String>> {
        let path = self.path_for(iface);
        let mut entries = HashMap::new();
        if !path.exists() {
            return Ok(entries);
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|source| NetworkError::Ifcfg {
                iface: iface.to_string(),
                source,
            })?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirIfcfgStore::new(dir.path());
        store.append("eth0", "MTU", "9000").unwrap();
        store.append("eth0", "OVSREQUIRES", "\"eth0 eth1\"").unwrap();

        let entries = store.read("eth0").unwrap();
        assert_eq!(entries.get("MTU").map(String::as_str), Some("9000"));
        assert_eq!(
            entries.get("OVSREQUIRES").map(String::as_str),
            Some("eth0 eth1")
        );
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirIfcfgStore::new(dir.path());
        assert!(store.read("eth9").unwrap().is_empty());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ifcfg-br0"),
            "# managed by fabricboot\n\nBOOTPROTO=none\nIPADDR=10.1.1.5\n",
        )
        .unwrap();
        let store = DirIfcfgStore::new(dir.path());
        let entries = store.read("br0").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("BOOTPROTO").map(String::as_str), Some("none"));
    }
}
