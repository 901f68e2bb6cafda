// # State Store Traits
//
// Persistent state touched by a sync run.
//
// ## Purpose
//
// - [`StateStore`] holds the last address the provider confirmed. Comparing
//   against it lets a run end without any provider traffic.
// - [`SettingsStore`] persists the zone id once it has been resolved, so later
//   runs skip the zone lookup.
//
// Both are written only after the corresponding remote operation succeeded.

use async_trait::async_trait;
use std::net::Ipv6Addr;

/// The cached "last known good" address
///
/// # Implementation Guidelines
///
/// - Writes must be atomic (write-temp-then-rename for files); a crash must
///   leave either the old or the new value.
/// - Unreadable content is reported as `Ok(None)`, not as an error, so a
///   damaged cache only costs one extra provider round trip.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The cached address, if any
    async fn last_address(&self) -> Result<Option<Ipv6Addr>, crate::Error>;

    /// Replace the cached address
    async fn store_address(&self, address: Ipv6Addr) -> Result<(), crate::Error>;
}

/// Write-back of values learned at runtime into the settings source
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Persist a freshly resolved zone id
    async fn save_zone_id(&self, zone_id: &str) -> Result<(), crate::Error>;
}
