//! Error types for fabric provisioning.

use thiserror::Error;

use fabricboot_common::CommandError;

/// Errors that can occur while provisioning the network fabric.
///
/// Configuration errors that cannot be resolved by warn-and-skip, and every
/// resource-absence error, are terminal: the driver logs them, records the
/// failure marker, and exits nonzero.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Invalid desired-state configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared NIC pool ran out before this vswitch could be assigned.
    #[error("no NIC available to use with vswitch {0}")]
    PoolExhausted(String),

    /// No uplink matched the vswitch's matchers, even after the speed
    /// fallback retry.
    #[error("could not find any uplinks which could be added to vswitch {0}")]
    NoUplinks(String),

    /// No bond member could reach the connectivity probe target.
    #[error("no interface in bond {bond} could reach target ip {target}")]
    NoReachableUplink { bond: String, target: String },

    /// Persisted interface configuration could not be read or written.
    #[error("interface config for {iface}: {source}")]
    Ifcfg {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    /// Hardware inventory could not be read.
    #[error("NIC inventory: {0}")]
    Inventory(String),

    /// An external command failed after its bounded retries.
    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
