// # DNS Provider Trait
//
// Defines the interface for publishing the AAAA record.
//
// ## Implementations
//
// - Cloudflare API v4: `ddns6-provider-cloudflare` crate

use crate::error::ProviderError;
use async_trait::async_trait;
use std::fmt;
use std::net::Ipv6Addr;

/// The record the provider should hold after an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    /// Fully qualified name (`record.zone`)
    pub fqdn: String,
    /// Address to publish
    pub address: Ipv6Addr,
    /// Record TTL in seconds
    pub ttl: u32,
    /// Provider-side proxying flag
    pub proxied: bool,
}

impl RecordSpec {
    /// Record type, always `AAAA`
    pub const RECORD_TYPE: &'static str = "AAAA";
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created
    Created {
        /// Provider record id
        record_id: String,
    },
    /// An existing record differed and was replaced
    Updated {
        /// Provider record id
        record_id: String,
        /// Content before the update
        previous_content: String,
    },
    /// The existing record already matched; nothing was written
    Unchanged {
        /// Provider record id
        record_id: String,
    },
    /// Dry-run mode: the write was skipped
    DryRun {
        /// Whether a create (true) or an update (false) would have happened
        would_create: bool,
    },
}

impl UpsertOutcome {
    /// True when the provider now holds the requested record
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, UpsertOutcome::DryRun { .. })
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Created { record_id } => write!(f, "created record {record_id}"),
            UpsertOutcome::Updated {
                record_id,
                previous_content,
            } => write!(f, "updated record {record_id} (was {previous_content})"),
            UpsertOutcome::Unchanged { record_id } => {
                write!(f, "record {record_id} already up to date")
            }
            UpsertOutcome::DryRun { would_create: true } => f.write_str("dry-run: would create"),
            UpsertOutcome::DryRun {
                would_create: false,
            } => f.write_str("dry-run: would update"),
        }
    }
}

/// Trait for DNS provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Idempotency
///
/// [`upsert_record`](DnsProvider::upsert_record) searches before writing:
/// an identical record (content, TTL, proxied) is left untouched, a differing
/// one is replaced, a missing one is created. Calling it twice with the same
/// spec performs at most one write.
///
/// # Retries
///
/// Transport retry lives in the provider's HTTP client; the engine calls each
/// method once per run.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the opaque zone id for `zone`
    async fn resolve_zone_id(&self, zone: &str) -> Result<String, ProviderError>;

    /// Make the provider hold exactly `record` in zone `zone_id`
    async fn upsert_record(
        &self,
        zone_id: &str,
        record: &RecordSpec,
    ) -> Result<UpsertOutcome, ProviderError>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;

    /// Whether writes are skipped; callers must not persist anything either
    fn is_dry_run(&self) -> bool {
        false
    }
}
