//! Error types for live domain reconciliation.

use thiserror::Error;

use fabricboot_common::CommandError;

/// Errors that can occur while reconciling the CVM domain.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No running domain matched the CVM naming convention.
    #[error("could not find CVM domain")]
    CvmNotFound,

    /// The domain descriptor could not be read.
    #[error("failed to read domain descriptor: {0}")]
    DescriptorFailed(String),

    /// No live device carries the MAC required by a declared interface.
    /// Devices are never fabricated, so this is always fatal.
    #[error("could not find CVM NIC with MAC {mac} for interface {iface}")]
    DeviceNotFound { iface: String, mac: String },

    /// A CVM-side MAC address could not be resolved.
    #[error("failed to resolve MAC of CVM interface {0}")]
    MacResolveFailed(String),

    /// Device detach failed; the device is still attached.
    #[error("failed to detach device: {0}")]
    DetachFailed(String),

    /// Device attach failed after a successful detach; the device is left
    /// detached, no rollback is attempted.
    #[error("failed to attach device: {0}")]
    AttachFailed(String),

    /// The domain descriptor XML could not be parsed.
    #[error("XML error: {0}")]
    Xml(String),

    /// Libvirt network setup failed.
    #[error("network definition failed: {0}")]
    NetworkFailed(String),

    /// An external command failed after its bounded retries.
    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type Result<T> = std::result::Result<T, DomainError>;
