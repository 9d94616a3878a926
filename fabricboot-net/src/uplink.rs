//! Uplink matcher: resolves a vswitch's uplink specification to concrete
//! NICs from the shared pool.
//!
//! The pool arrives pre-sorted descending by max supported speed and is
//! evaluated in that order, so higher-speed NICs win ties. A candidate
//! matches an identifier by interface name, case-insensitive MAC, or driver.
//! When a speed filter is present, a matched candidate must additionally
//! support at least one listed speed; non-conforming candidates return to
//! the pool for later matchers.

use tracing::info;

use crate::error::{NetworkError, Result};
use crate::types::{NicRecord, VSwitchSpec, DEFAULT_UPLINK_DRIVERS};

/// Outcome of matching one vswitch against the pool.
#[derive(Debug)]
pub struct UplinkMatch {
    /// NICs claimed by this vswitch, in match order.
    pub matched: Vec<NicRecord>,
    /// Pool left for later vswitches.
    pub remaining: Vec<NicRecord>,
}

fn identifier_matches(nic: &NicRecord, identifier: &str) -> bool {
    nic.name == identifier
        || nic.mac.as_str().eq_ignore_ascii_case(identifier)
        || nic.driver == identifier
}

/// One matching pass over the pool with the given identifiers and speeds.
fn match_pass(identifiers: &[String], speeds: &[u32], pool: Vec<NicRecord>) -> UplinkMatch {
    let mut matched = Vec::new();
    let mut remaining = pool;
    for identifier in identifiers {
        let mut next_remaining = Vec::new();
        for nic in remaining {
            if identifier_matches(&nic, identifier) {
                if speeds.is_empty() || nic.supports_any(speeds) {
                    matched.push(nic);
                } else {
                    // Matched the identifier but not the speed filter; give
                    // it back to the pool.
                    next_remaining.push(nic);
                }
            } else {
                next_remaining.push(nic);
            }
        }
        remaining = next_remaining;
    }
    UplinkMatch { matched, remaining }
}

/// Resolve a vswitch's uplinks from the pool.
///
/// A speed-filtered matcher that yields nothing retries exactly once with the
/// single highest speed among the remaining pool appended to the filter; if
/// still empty that is fatal for the vswitch. A filterless matcher that
/// yields nothing returns an empty match, which the provisioner turns into
/// the broader fallback bond.
pub fn resolve_uplinks(vs: &VSwitchSpec, pool: Vec<NicRecord>) -> Result<UplinkMatch> {
    let identifiers: Vec<String> = if vs.uplinks.is_empty() {
        DEFAULT_UPLINK_DRIVERS.iter().map(|d| d.to_string()).collect()
    } else {
        vs.uplinks.clone()
    };

    let result = match_pass(&identifiers, &vs.uplink_speeds, pool.clone());
    if !result.matched.is_empty() || vs.uplink_speeds.is_empty() {
        return Ok(result);
    }

    // Speed-filtered matcher found nothing. Fall back once to the highest
    // speed still present in the pool.
    let top_speed = pool.iter().filter_map(NicRecord::max_speed).max();
    if let Some(top_speed) = top_speed {
        if !vs.uplink_speeds.contains(&top_speed) {
            info!(
                vswitch = %vs.name,
                wanted = ?vs.uplink_speeds,
                fallback = top_speed,
                "no NICs with requested speeds, falling back to highest available speed"
            );
            let mut speeds = vs.uplink_speeds.clone();
            speeds.push(top_speed);
            let retry = match_pass(&identifiers, &speeds, pool);
            if !retry.matched.is_empty() {
                return Ok(retry);
            }
        }
    }

    Err(NetworkError::NoUplinks(vs.name.clone()))
}
