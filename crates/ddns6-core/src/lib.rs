// # ddns6-core
//
// Core library for keeping one AAAA record in sync with a host's IPv6 address.
//
// ## Architecture Overview
//
// - **AddressRecord**: One observed IPv6 address and its classification
// - **select_best**: Pure ranking of candidate addresses
// - **InterfaceAddressSource / RemoteAddressSource**: Where addresses come from
// - **ResilientClient**: Proxy-aware HTTP with retry and backoff
// - **DnsProvider**: Zone lookup and idempotent record upsert
// - **StateStore / SettingsStore**: Cached address and zone id write-back
// - **SyncEngine**: One run of acquire → select → compare → publish → persist
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from OS and provider code
// 2. **One Classification Path**: Every record goes through `AddressRecord::classify`
// 3. **Library-First**: The binary only wires settings, logging and exit codes
// 4. **Persist After Success**: Cache and zone id are written only after the
//    provider confirmed the corresponding operation

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod select;
pub mod state;
pub mod traits;
pub mod transport;

// Re-export core types for convenience
pub use address::{AddressRecord, AddressState, INFINITE_LIFETIME, Scope};
pub use config::Settings;
pub use engine::{AddressOrigin, SyncDecision, SyncEngine, SyncEvent, SyncOutcome};
pub use error::{Error, Result};
pub use select::select_best;
pub use state::{FileStateStore, JsonSettingsStore, MemoryStateStore};
pub use traits::{
    DnsProvider, InterfaceAddressSource, RecordSpec, RemoteAddressSource, SettingsStore,
    StateStore, UpsertOutcome,
};
pub use transport::{HttpReply, HttpRequest, HttpTransport, ResilientClient, RetryPolicy};
