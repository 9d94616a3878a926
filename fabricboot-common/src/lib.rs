//! # fabricboot Common
//!
//! Shared utilities for the fabricboot components: logging initialization,
//! the bounded-attempt shell command runner, the canonical MAC address type,
//! and the failure-marker helper used on fatal exits.

pub mod logging;
pub mod mac;
pub mod marker;
pub mod shell;

pub use logging::{init_logging, init_logging_json};
pub use mac::MacAddr;
pub use marker::write_failure_marker;
pub use shell::{CmdOutput, CommandError, CommandRunner, RunOpts, ShellRunner};
