//! Canonical MAC address type.
//!
//! Live VM NIC devices are matched against desired state by MAC address only,
//! so every MAC that enters the system is normalized to lowercase
//! colon-separated hex at the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string is not a valid MAC address.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address: {0}")]
pub struct InvalidMac(pub String);

/// A MAC address in canonical form: six lowercase hex octets joined by colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(String);

impl MacAddr {
    /// The canonical string form, e.g. `52:54:00:ab:cd:ef`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MacAddr {
    type Err = InvalidMac;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(InvalidMac(s.to_string()));
        }
        for octet in &octets {
            if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(InvalidMac(s.to_string()));
            }
        }
        Ok(MacAddr(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = InvalidMac;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> String {
        mac.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_case() {
        let mac: MacAddr = "52:54:00:AB:CD:EF".parse().unwrap();
        assert_eq!(mac.as_str(), "52:54:00:ab:cd:ef");
    }

    #[test]
    fn equality_is_case_insensitive_via_normalization() {
        let a: MacAddr = "00:1B:21:0a:0b:0c".parse().unwrap();
        let b: MacAddr = "00:1b:21:0A:0B:0C".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("52:54:00:ab:cd".parse::<MacAddr>().is_err());
        assert!("52:54:00:ab:cd:zz".parse::<MacAddr>().is_err());
        assert!("5254.00ab.cdef".parse::<MacAddr>().is_err());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let mac: MacAddr = " 52:54:00:ab:cd:ef\n".parse().unwrap();
        assert_eq!(mac.as_str(), "52:54:00:ab:cd:ef");
    }
}
