//! Test doubles and common utilities for sync contract tests
//!
//! Every double is `Clone` and shares its counters between clones, so a test
//! keeps one handle while the engine owns the boxed other.

#![allow(dead_code)]

use ddns6_core::error::{DiscoveryError, ProbeError, ProviderError};
use ddns6_core::traits::{
    DnsProvider, InterfaceAddressSource, RecordSpec, RemoteAddressSource, SettingsStore,
    StateStore, UpsertOutcome,
};
use ddns6_core::{AddressRecord, Error, MemoryStateStore, Settings};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn addr(s: &str) -> Ipv6Addr {
    s.parse().expect("valid IPv6 literal")
}

pub fn record(s: &str, preferred: u64, valid: u64) -> AddressRecord {
    AddressRecord::from_secs(addr(s), preferred, valid).expect("not IPv4-mapped")
}

/// Settings for `home.example.com` with the given address sources
pub fn settings(interface: Option<&str>, urls: &[&str]) -> Settings {
    let json = serde_json::json!({
        "provider": "cloudflare",
        "get_ip": {
            "interface": interface.unwrap_or_default(),
            "urls": urls,
        },
        "work_dir": "",
        "provider_options": {
            "api_token": "test-token",
            "proxied": false,
            "ttl": 0,
            "domain": { "zone": "example.com", "record": "home" }
        }
    });
    serde_json::from_value(json).expect("valid settings")
}

/// Interface reader returning a fixed result
#[derive(Clone)]
pub struct MockInterfaceReader {
    result: Result<Vec<AddressRecord>, DiscoveryError>,
    calls: Arc<AtomicUsize>,
    last_interface: Arc<Mutex<Option<String>>>,
}

impl MockInterfaceReader {
    pub fn returning(records: Vec<AddressRecord>) -> Self {
        Self::with_result(Ok(records))
    }

    pub fn failing(error: DiscoveryError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(result: Result<Vec<AddressRecord>, DiscoveryError>) -> Self {
        Self {
            result,
            calls: Arc::new(AtomicUsize::new(0)),
            last_interface: Arc::new(Mutex::new(None)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_interface(&self) -> Option<String> {
        self.last_interface.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InterfaceAddressSource for MockInterfaceReader {
    async fn list_addresses(&self, interface: &str) -> Result<Vec<AddressRecord>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_interface.lock().unwrap() = Some(interface.to_string());
        self.result.clone()
    }

    fn mechanism(&self) -> &'static str {
        "mock"
    }
}

/// Remote probe returning a fixed result
#[derive(Clone)]
pub struct MockProbe {
    result: Result<AddressRecord, ProbeError>,
    calls: Arc<AtomicUsize>,
}

impl MockProbe {
    pub fn returning(address: &str) -> Self {
        Self {
            result: Ok(AddressRecord::without_lease(addr(address)).expect("not IPv4-mapped")),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self {
            result: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteAddressSource for MockProbe {
    async fn resolve(&self) -> Result<AddressRecord, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// In-memory provider with upsert semantics and call counters
#[derive(Clone)]
pub struct MockDnsProvider {
    zone_id: String,
    existing: Arc<Mutex<Option<RecordSpec>>>,
    zone_lookups: Arc<AtomicUsize>,
    upserts: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    upsert_error: Arc<Mutex<Option<ProviderError>>>,
    zone_error: Arc<Mutex<Option<ProviderError>>>,
    dry_run: bool,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            zone_id: "zone-123".to_string(),
            existing: Arc::new(Mutex::new(None)),
            zone_lookups: Arc::new(AtomicUsize::new(0)),
            upserts: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            upsert_error: Arc::new(Mutex::new(None)),
            zone_error: Arc::new(Mutex::new(None)),
            dry_run: false,
        }
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::new()
        }
    }

    /// Pretend the provider already holds `spec`
    pub fn with_existing(self, spec: RecordSpec) -> Self {
        *self.existing.lock().unwrap() = Some(spec);
        self
    }

    pub fn fail_upserts_with(&self, error: ProviderError) {
        *self.upsert_error.lock().unwrap() = Some(error);
    }

    pub fn fail_zone_lookup_with(&self, error: ProviderError) {
        *self.zone_error.lock().unwrap() = Some(error);
    }

    pub fn zone_lookup_count(&self) -> usize {
        self.zone_lookups.load(Ordering::SeqCst)
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.zone_lookup_count() + self.upsert_count()
    }

    pub fn published(&self) -> Option<RecordSpec> {
        self.existing.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn resolve_zone_id(&self, zone: &str) -> Result<String, ProviderError> {
        self.zone_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.zone_error.lock().unwrap().clone() {
            return Err(error);
        }
        assert_eq!(zone, "example.com");
        Ok(self.zone_id.clone())
    }

    async fn upsert_record(
        &self,
        zone_id: &str,
        spec: &RecordSpec,
    ) -> Result<UpsertOutcome, ProviderError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        assert_eq!(zone_id, self.zone_id);
        if let Some(error) = self.upsert_error.lock().unwrap().clone() {
            return Err(error);
        }

        let mut existing = self.existing.lock().unwrap();
        let outcome = match existing.as_ref() {
            Some(current) if current == spec => {
                return Ok(UpsertOutcome::Unchanged {
                    record_id: "rec-1".into(),
                });
            }
            Some(_) if self.dry_run => return Ok(UpsertOutcome::DryRun { would_create: false }),
            None if self.dry_run => return Ok(UpsertOutcome::DryRun { would_create: true }),
            Some(current) => UpsertOutcome::Updated {
                record_id: "rec-1".into(),
                previous_content: current.address.to_string(),
            },
            None => UpsertOutcome::Created {
                record_id: "rec-1".into(),
            },
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        *existing = Some(spec.clone());
        Ok(outcome)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Memory store that counts writes and can be told to fail them
#[derive(Clone, Default)]
pub struct MockStateStore {
    inner: MemoryStateStore,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: &str) -> Self {
        Self {
            inner: MemoryStateStore::with_address(addr(address)),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn cached(&self) -> Option<Ipv6Addr> {
        self.inner.last_address().await.expect("memory store never fails")
    }
}

#[async_trait::async_trait]
impl StateStore for MockStateStore {
    async fn last_address(&self) -> Result<Option<Ipv6Addr>, Error> {
        self.inner.last_address().await
    }

    async fn store_address(&self, address: Ipv6Addr) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::state_store("read-only file system"));
        }
        self.inner.store_address(address).await
    }
}

/// Settings store recording every zone id it was asked to save
#[derive(Clone, Default)]
pub struct RecordingSettingsStore {
    saved: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SettingsStore for RecordingSettingsStore {
    async fn save_zone_id(&self, zone_id: &str) -> Result<(), Error> {
        self.saved.lock().unwrap().push(zone_id.to_string());
        if self.fail {
            return Err(Error::state_store("permission denied"));
        }
        Ok(())
    }
}
