//! Best-candidate selection
//!
//! Among candidate records, the one with the longest preferred lifetime wins.
//! Ties keep the earliest record, so readers that return addresses in a
//! meaningful order (kernel order, probe order) keep that precedence.

use crate::address::AddressRecord;
use crate::error::{Error, Result};
use std::net::Ipv6Addr;
use std::time::Duration;

/// Pick the address to publish
///
/// Fails with [`Error::NoCandidate`] when no record is a candidate. A sole
/// candidate with a zero preferred lifetime still wins.
pub fn select_best(records: &[AddressRecord]) -> Result<Ipv6Addr> {
    let mut best: Option<&AddressRecord> = None;
    let mut max_preferred = Duration::ZERO;

    for record in records.iter().filter(|r| r.is_candidate()) {
        if best.is_none() || record.preferred_lifetime() > max_preferred {
            max_preferred = record.preferred_lifetime();
            best = Some(record);
        }
    }

    best.map(AddressRecord::address).ok_or(Error::NoCandidate)
}
