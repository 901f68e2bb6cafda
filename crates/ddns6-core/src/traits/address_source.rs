// # Address Source Traits
//
// Where candidate IPv6 addresses come from.
//
// ## Implementations
//
// - Local interface: `ddns6-ip-iface` crate (netlink, ioctl or `ifconfig` text)
// - Remote echo services: `ddns6-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns6_core::{InterfaceAddressSource, select_best};
//
// let records = reader.list_addresses("eth0").await?;
// let best = select_best(&records)?;
// ```

use crate::address::AddressRecord;
use crate::error::{DiscoveryError, ProbeError};
use async_trait::async_trait;

/// Lists the IPv6 addresses configured on one named interface
///
/// Every returned record must come out of [`AddressRecord::classify`].
/// Implementations drop IPv4-mapped addresses and report
/// [`DiscoveryError::NoGlobalAddress`] instead of returning an empty list.
#[async_trait]
pub trait InterfaceAddressSource: Send + Sync {
    /// Query the OS for the addresses on `interface`
    async fn list_addresses(&self, interface: &str)
    -> Result<Vec<AddressRecord>, DiscoveryError>;

    /// Short name of the mechanism used (for logging)
    fn mechanism(&self) -> &'static str;
}

/// Resolves the host's public IPv6 address from outside
#[async_trait]
pub trait RemoteAddressSource: Send + Sync {
    /// Produce one record, classified with infinite lifetimes
    async fn resolve(&self) -> Result<AddressRecord, ProbeError>;
}
