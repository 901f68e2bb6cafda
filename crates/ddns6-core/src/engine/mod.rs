//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Reading addresses from the configured interface, falling back to the
//!   remote probe when that fails
//! - Selecting the best candidate
//! - Comparing it with the cached address
//! - Resolving the zone id (once) and upserting the AAAA record
//! - Persisting the new address after the provider confirmed it
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  fails  ┌─────────────────────┐
//! │InterfaceAddressSource│────────▶│ RemoteAddressSource │
//! └──────────────────────┘         └─────────────────────┘
//!            │ records                       │ record
//!            └──────────────┬────────────────┘
//!                           ▼
//!                    ┌─────────────┐
//!                    │ select_best │
//!                    └─────────────┘
//!                           │
//!                           ▼
//!                    ┌─────────────┐   unchanged   ┌──────┐
//!                    │ StateStore  │──────────────▶│ done │
//!                    │  (compare)  │               └──────┘
//!                    └─────────────┘
//!                           │ changed or forced
//!                           ▼
//! ┌───────────────┐  ┌─────────────┐        ┌─────────────┐
//! │ SettingsStore │◀─│ DnsProvider │───────▶│ StateStore  │
//! │  (zone id)    │  │ zone+upsert │  ok    │  (persist)  │
//! └───────────────┘  └─────────────┘        └─────────────┘
//! ```
//!
//! Every step emits a [`SyncEvent`] on a bounded channel.

use crate::address::AddressRecord;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::select::select_best;
use crate::traits::{
    DnsProvider, InterfaceAddressSource, RecordSpec, RemoteAddressSource, SettingsStore,
    StateStore, UpsertOutcome,
};
use std::fmt;
use std::net::Ipv6Addr;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Where the selected address came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressOrigin {
    /// Read from the named local interface
    Interface(String),
    /// Returned by a remote echo service
    Remote,
}

impl fmt::Display for AddressOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOrigin::Interface(name) => write!(f, "interface {name}"),
            AddressOrigin::Remote => f.write_str("remote probe"),
        }
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A run started
    RunStarted { forced: bool },

    /// Reading the interface failed; the remote probe is used instead
    InterfaceFailed { interface: String, error: String },

    /// An address was selected
    AddressSelected {
        address: Ipv6Addr,
        origin: AddressOrigin,
    },

    /// Selected address equals the cached one; nothing to do
    UpToDate { address: Ipv6Addr },

    /// The zone id was looked up
    ZoneResolved { zone: String, zone_id: String },

    /// The provider accepted the record
    RecordPublished {
        fqdn: String,
        address: Ipv6Addr,
        outcome: UpsertOutcome,
    },

    /// The provider update succeeded but the cache could not be written
    CacheWriteFailed { address: Ipv6Addr, error: String },

    /// The run failed
    RunFailed { error: String },
}

/// The single gate for provider I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDecision {
    /// Address chosen by the selector
    pub selected: Ipv6Addr,
    /// Address found in the cache
    pub previous: Option<Ipv6Addr>,
    /// `selected != previous`
    pub changed: bool,
    /// Cache comparison was overridden
    pub forced: bool,
}

impl SyncDecision {
    /// Compare the selection with the cached value
    pub fn new(selected: Ipv6Addr, previous: Option<Ipv6Addr>, forced: bool) -> Self {
        Self {
            selected,
            previous,
            changed: previous != Some(selected),
            forced,
        }
    }

    /// Whether the provider must be contacted
    pub fn requires_publish(&self) -> bool {
        self.changed || self.forced
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Cached address equals the selected one; the provider was not contacted
    Unchanged { address: Ipv6Addr },

    /// The provider holds the address and the cache is current
    Published {
        address: Ipv6Addr,
        previous: Option<Ipv6Addr>,
        upsert: UpsertOutcome,
    },

    /// The provider holds the address but the cache write failed
    PublishedCacheStale {
        address: Ipv6Addr,
        upsert: UpsertOutcome,
        error: String,
    },

    /// Dry-run: lookups only, nothing written anywhere
    DryRun { address: Ipv6Addr },
}

impl SyncOutcome {
    /// The address this run settled on
    pub fn address(&self) -> Ipv6Addr {
        match self {
            SyncOutcome::Unchanged { address }
            | SyncOutcome::Published { address, .. }
            | SyncOutcome::PublishedCacheStale { address, .. }
            | SyncOutcome::DryRun { address } => *address,
        }
    }

    /// True for the warning outcome
    pub fn is_warning(&self) -> bool {
        matches!(self, SyncOutcome::PublishedCacheStale { .. })
    }
}

/// What the engine publishes
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncTarget {
    zone: String,
    fqdn: String,
    ttl: u32,
    proxied: bool,
}

/// Core sync engine
///
/// One [`run_once`](SyncEngine::run_once) call is one complete sync. The
/// engine is meant to be driven by cron, a systemd timer or any other
/// scheduler.
///
/// Persisted state (cache, zone id) is written only after the corresponding
/// remote operation succeeded; every failure before that leaves it untouched.
pub struct SyncEngine {
    /// Interface to read (None: remote probe only)
    interface: Option<String>,

    /// Local address reader
    reader: Box<dyn InterfaceAddressSource>,

    /// Remote fallback
    probe: Box<dyn RemoteAddressSource>,

    /// DNS provider for updating the record
    provider: Box<dyn DnsProvider>,

    /// Cached last published address
    state_store: Box<dyn StateStore>,

    /// Zone id write-back
    settings_store: Option<Box<dyn SettingsStore>>,

    /// Record definition
    target: SyncTarget,

    /// Zone id, from settings or resolved during this process
    zone_id: Mutex<Option<String>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields sync events
    pub fn new(
        reader: Box<dyn InterfaceAddressSource>,
        probe: Box<dyn RemoteAddressSource>,
        provider: Box<dyn DnsProvider>,
        state_store: Box<dyn StateStore>,
        settings: &Settings,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        settings.validate()?;

        let (tx, rx) = mpsc::channel(settings.engine.event_channel_capacity);

        let engine = Self {
            interface: settings.interface().map(str::to_string),
            reader,
            probe,
            provider,
            state_store,
            settings_store: None,
            target: SyncTarget {
                zone: settings.provider_options.domain.zone.clone(),
                fqdn: settings.fqdn(),
                ttl: settings.ttl(),
                proxied: settings.provider_options.proxied,
            },
            zone_id: Mutex::new(settings.zone_id().map(str::to_string)),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Persist resolved zone ids through `store`
    pub fn with_settings_store(mut self, store: Box<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Run one sync
    ///
    /// `force` skips the cache comparison and always contacts the provider.
    pub async fn run_once(&self, force: bool) -> Result<SyncOutcome> {
        self.emit_event(SyncEvent::RunStarted { forced: force });

        let result = self.run_inner(force).await;
        if let Err(e) = &result {
            self.emit_event(SyncEvent::RunFailed {
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_inner(&self, force: bool) -> Result<SyncOutcome> {
        let (records, origin) = self.acquire().await?;
        let selected = select_best(&records)?;
        info!("Selected {} from {}", selected, origin);
        self.emit_event(SyncEvent::AddressSelected {
            address: selected,
            origin,
        });

        let previous = self.state_store.last_address().await?;
        let decision = SyncDecision::new(selected, previous, force);

        if !decision.requires_publish() {
            info!("IP has not changed: {}", selected);
            self.emit_event(SyncEvent::UpToDate { address: selected });
            return Ok(SyncOutcome::Unchanged { address: selected });
        }

        if decision.forced && !decision.changed {
            info!("Cache matches {}, forcing update anyway", selected);
        }

        self.publish(decision).await
    }

    /// Local interface first, remote probe on failure or when none is configured
    async fn acquire(&self) -> Result<(Vec<AddressRecord>, AddressOrigin)> {
        if let Some(interface) = &self.interface {
            match self.reader.list_addresses(interface).await {
                Ok(records) => {
                    for record in &records {
                        debug!("{}: {}", interface, record);
                    }
                    return Ok((records, AddressOrigin::Interface(interface.clone())));
                }
                Err(e) => {
                    info!(
                        "Interface {} failed ({}): {}",
                        interface,
                        self.reader.mechanism(),
                        e
                    );
                    info!("Trying fallback URLs...");
                    self.emit_event(SyncEvent::InterfaceFailed {
                        interface: interface.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let record = self.probe.resolve().await?;
        debug!("remote: {}", record);
        Ok((vec![record], AddressOrigin::Remote))
    }

    async fn publish(&self, decision: SyncDecision) -> Result<SyncOutcome> {
        let address = decision.selected;
        let zone_id = self.zone_id().await?;

        let spec = RecordSpec {
            fqdn: self.target.fqdn.clone(),
            address,
            ttl: self.target.ttl,
            proxied: self.target.proxied,
        };

        let upsert = self.provider.upsert_record(&zone_id, &spec).await?;

        if !upsert.is_confirmed() {
            info!("Dry run for {} -> {}: {}", spec.fqdn, address, upsert);
            return Ok(SyncOutcome::DryRun { address });
        }

        info!("DDNS update successful: {} -> {} ({})", spec.fqdn, address, upsert);
        self.emit_event(SyncEvent::RecordPublished {
            fqdn: spec.fqdn.clone(),
            address,
            outcome: upsert.clone(),
        });

        if !decision.changed {
            debug!("Cache already holds {}, not rewriting", address);
        } else if let Err(e) = self.state_store.store_address(address).await {
            warn!("Update succeeded, but failed to write IP to cache: {}", e);
            self.emit_event(SyncEvent::CacheWriteFailed {
                address,
                error: e.to_string(),
            });
            return Ok(SyncOutcome::PublishedCacheStale {
                address,
                upsert,
                error: e.to_string(),
            });
        }

        Ok(SyncOutcome::Published {
            address,
            previous: decision.previous,
            upsert,
        })
    }

    /// Cached zone id, or look it up and write it back
    async fn zone_id(&self) -> Result<String> {
        let mut cached = self.zone_id.lock().await;
        if let Some(zone_id) = cached.as_ref() {
            return Ok(zone_id.clone());
        }

        let zone_id = self.provider.resolve_zone_id(&self.target.zone).await?;
        info!(
            "Resolved zone {} to {} via {}",
            self.target.zone,
            zone_id,
            self.provider.provider_name()
        );
        self.emit_event(SyncEvent::ZoneResolved {
            zone: self.target.zone.clone(),
            zone_id: zone_id.clone(),
        });

        match &self.settings_store {
            Some(_) if self.provider.is_dry_run() => {
                debug!("Dry-run: not saving Zone ID {} to settings", zone_id);
            }
            Some(store) => {
                if let Err(e) = store.save_zone_id(&zone_id).await {
                    warn!("Failed to save Zone ID to settings: {}", e);
                }
            }
            None => {}
        }

        *cached = Some(zone_id.clone());
        Ok(zone_id)
    }

    /// Emit a sync event
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("interface", &self.interface)
            .field("reader", &self.reader.mechanism())
            .field("provider", &self.provider.provider_name())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Convenience for callers that only need to know whether an error is fatal
/// for configuration reasons
pub fn is_config_error(error: &Error) -> bool {
    matches!(error, Error::Config(_) | Error::Proxy(_))
}
