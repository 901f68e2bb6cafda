//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces the sync engine drives.
//!
//! - [`InterfaceAddressSource`]: List IPv6 addresses on a local interface
//! - [`RemoteAddressSource`]: Ask remote echo services for our address
//! - [`DnsProvider`]: Zone lookup and idempotent AAAA upsert
//! - [`StateStore`]: The cached "last known good" address
//! - [`SettingsStore`]: Zone id write-back into the settings file

pub mod address_source;
pub mod dns_provider;
pub mod state_store;

pub use address_source::{InterfaceAddressSource, RemoteAddressSource};
pub use dns_provider::{DnsProvider, RecordSpec, UpsertOutcome};
pub use state_store::{SettingsStore, StateStore};
