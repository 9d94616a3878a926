//! Failure marker written on fatal provisioning errors.
//!
//! A later recovery or retry pass checks for this file to know that the
//! previous first-boot attempt died partway and resources may need clearing.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Utc;

/// Record a fatal provisioning failure at `path`.
///
/// The marker carries a timestamp and the failure reason; its presence is
/// what matters, so callers typically ignore errors from this best-effort
/// write on their way to a nonzero exit.
pub fn write_failure_marker(path: &Path, reason: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{} {}\n", Utc::now().to_rfc3339(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_reason_to_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fatal_marker");
        write_failure_marker(&path, "no uplink for vswitch br0").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("no uplink for vswitch br0"));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/markers/fatal_marker");
        write_failure_marker(&path, "boom").unwrap();
        assert!(path.exists());
    }
}
