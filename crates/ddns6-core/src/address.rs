//! IPv6 address records and their classification
//!
//! Every [`AddressRecord`] is produced by [`AddressRecord::classify`], so
//! `scope`, `state` and `is_candidate` can never disagree with the raw
//! address and lifetimes, whichever reader produced them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;

/// Lifetime given to addresses that carry no kernel lease (10 years)
///
/// Used for remote-probe results and for `forever`/`infinity` lifetimes.
pub const INFINITE_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Address scope, derived from the high-order bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// `fe80::/10`
    LinkLocal,
    /// `fc00::/7`
    UniqueLocal,
    /// Everything else
    GlobalUnicast,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::LinkLocal => "Link Local",
            Scope::UniqueLocal => "Unique Local (ULA)",
            Scope::GlobalUnicast => "Global Unicast",
        })
    }
}

/// Lease state, derived from the two lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressState {
    /// Valid lifetime is zero
    Expired,
    /// Preferred lifetime is zero but the address is still valid
    Deprecated,
    /// Preferred lifetime shorter than valid lifetime (SLAAC/DHCP lease)
    PreferredDynamic,
    /// Preferred lifetime at least as long as valid lifetime
    PreferredStatic,
}

impl fmt::Display for AddressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressState::Expired => "Expired",
            AddressState::Deprecated => "Deprecated",
            AddressState::PreferredDynamic => "Preferred/Dynamic",
            AddressState::PreferredStatic => "Preferred/Static",
        })
    }
}

/// One observed IPv6 address with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    address: Ipv6Addr,
    scope: Scope,
    preferred_lifetime: Duration,
    valid_lifetime: Duration,
    state: AddressState,
    is_candidate: bool,
}

impl AddressRecord {
    /// Classify a raw address and its lifetimes
    ///
    /// Lifetimes are truncated to whole seconds. Returns `None` for
    /// IPv4-mapped addresses (`::ffff:a.b.c.d`), which are never accepted.
    pub fn classify(
        address: Ipv6Addr,
        preferred_lifetime: Duration,
        valid_lifetime: Duration,
    ) -> Option<Self> {
        if is_ipv4_mapped(&address) {
            return None;
        }

        let preferred_lifetime = Duration::from_secs(preferred_lifetime.as_secs());
        let valid_lifetime = Duration::from_secs(valid_lifetime.as_secs());

        let scope = if address.is_unicast_link_local() {
            Scope::LinkLocal
        } else if address.is_unique_local() {
            Scope::UniqueLocal
        } else {
            Scope::GlobalUnicast
        };

        let deprecated = preferred_lifetime.is_zero() && !valid_lifetime.is_zero();
        let state = if valid_lifetime.is_zero() {
            AddressState::Expired
        } else if deprecated {
            AddressState::Deprecated
        } else if preferred_lifetime < valid_lifetime {
            AddressState::PreferredDynamic
        } else {
            AddressState::PreferredStatic
        };

        let is_candidate = scope == Scope::GlobalUnicast && !deprecated;

        Some(Self {
            address,
            scope,
            preferred_lifetime,
            valid_lifetime,
            state,
            is_candidate,
        })
    }

    /// Classify with lifetimes given in seconds
    pub fn from_secs(address: Ipv6Addr, preferred_secs: u64, valid_secs: u64) -> Option<Self> {
        Self::classify(
            address,
            Duration::from_secs(preferred_secs),
            Duration::from_secs(valid_secs),
        )
    }

    /// Classify an address that has no lease information (remote probes)
    pub fn without_lease(address: Ipv6Addr) -> Option<Self> {
        Self::classify(address, INFINITE_LIFETIME, INFINITE_LIFETIME)
    }

    /// Run the classification again from the stored raw fields
    pub fn reclassify(&self) -> Self {
        Self::classify(self.address, self.preferred_lifetime, self.valid_lifetime)
            .unwrap_or_else(|| self.clone())
    }

    /// The address itself
    pub fn address(&self) -> Ipv6Addr {
        self.address
    }

    /// Derived scope
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Preferred lifetime (whole seconds)
    pub fn preferred_lifetime(&self) -> Duration {
        self.preferred_lifetime
    }

    /// Valid lifetime (whole seconds)
    pub fn valid_lifetime(&self) -> Duration {
        self.valid_lifetime
    }

    /// Derived lease state
    pub fn state(&self) -> AddressState {
        self.state
    }

    /// Whether this address may be published
    pub fn is_candidate(&self) -> bool {
        self.is_candidate
    }
}

impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}, preferred {}s, valid {}s]",
            self.address,
            self.scope,
            self.state,
            self.preferred_lifetime.as_secs(),
            self.valid_lifetime.as_secs()
        )
    }
}

/// `::ffff:0:0/96`
pub fn is_ipv4_mapped(address: &Ipv6Addr) -> bool {
    address.to_ipv4_mapped().is_some()
}

/// Link-local unicast, unique local or loopback
pub fn is_private_or_local(address: &Ipv6Addr) -> bool {
    address.is_unicast_link_local() || address.is_unique_local() || address.is_loopback()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn global_dynamic_address_is_candidate() {
        let rec = AddressRecord::from_secs(addr("2001:db8::1"), 3600, 7200).unwrap();
        assert_eq!(rec.scope(), Scope::GlobalUnicast);
        assert_eq!(rec.state(), AddressState::PreferredDynamic);
        assert!(rec.is_candidate());
    }

    #[test]
    fn probe_address_is_static_candidate() {
        let rec = AddressRecord::without_lease(addr("2001:db8::5")).unwrap();
        assert_eq!(rec.state(), AddressState::PreferredStatic);
        assert_eq!(rec.preferred_lifetime(), INFINITE_LIFETIME);
        assert_eq!(INFINITE_LIFETIME.as_secs(), 315_360_000);
        assert!(rec.is_candidate());
    }

    #[test]
    fn deprecated_address_is_not_candidate() {
        let rec = AddressRecord::from_secs(addr("2001:db8::1"), 0, 600).unwrap();
        assert_eq!(rec.state(), AddressState::Deprecated);
        assert!(!rec.is_candidate());
    }

    #[test]
    fn expired_address_is_still_candidate() {
        // valid == 0 is Expired, not Deprecated
        let rec = AddressRecord::from_secs(addr("2001:db8::1"), 0, 0).unwrap();
        assert_eq!(rec.state(), AddressState::Expired);
        assert!(rec.is_candidate());
    }

    #[test]
    fn unique_local_and_link_local_are_excluded() {
        let ula = AddressRecord::from_secs(addr("fd12:3456::1"), 3600, 3600).unwrap();
        let ll = AddressRecord::from_secs(addr("fe80::1"), 3600, 3600).unwrap();

        assert_eq!(ula.scope(), Scope::UniqueLocal);
        assert_eq!(ll.scope(), Scope::LinkLocal);
        assert!(!ula.is_candidate());
        assert!(!ll.is_candidate());
    }

    #[test]
    fn ipv4_mapped_is_rejected() {
        assert!(AddressRecord::from_secs(addr("::ffff:192.0.2.1"), 60, 60).is_none());
    }

    #[test]
    fn lifetimes_truncate_to_seconds() {
        let rec = AddressRecord::classify(
            addr("2001:db8::1"),
            Duration::from_millis(1500),
            Duration::from_millis(2999),
        )
        .unwrap();
        assert_eq!(rec.preferred_lifetime(), Duration::from_secs(1));
        assert_eq!(rec.valid_lifetime(), Duration::from_secs(2));
    }

    #[test]
    fn classification_is_idempotent() {
        let samples = [
            AddressRecord::from_secs(addr("2001:db8::1"), 3600, 7200),
            AddressRecord::from_secs(addr("2001:db8::2"), 0, 600),
            AddressRecord::from_secs(addr("fc00::1"), 100, 100),
            AddressRecord::from_secs(addr("fe80::1"), 0, 0),
            AddressRecord::without_lease(addr("2001:db8::5")),
        ];
        for rec in samples.into_iter().flatten() {
            assert_eq!(rec.reclassify(), rec);
        }
    }

    #[test]
    fn private_or_local_predicate() {
        assert!(is_private_or_local(&addr("fe80::1")));
        assert!(is_private_or_local(&addr("fc00::1")));
        assert!(is_private_or_local(&addr("fd00::1")));
        assert!(is_private_or_local(&addr("::1")));
        assert!(!is_private_or_local(&addr("2001:db8::1")));
    }
}
