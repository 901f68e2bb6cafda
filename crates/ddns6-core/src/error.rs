//! Error types for the DDNS system
//!
//! This module defines all error types used throughout the crate. The
//! top-level [`Error`] mirrors the run-level taxonomy; the component errors
//! ([`DiscoveryError`], [`ProbeError`], [`ProxyError`], [`TransportError`],
//! [`ProviderError`]) are what the individual traits return.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local interface discovery failed
    #[error("Address discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Remote probe failed after exhausting every URL
    #[error("Remote probe failed: {0}")]
    RemoteProbe(#[from] ProbeError),

    /// Discovery succeeded but no address qualified
    #[error("No suitable address: no global unicast, non-deprecated IPv6 address found")]
    NoCandidate,

    /// DNS provider errors (API-reported or transport exhaustion)
    #[error("DNS provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Proxy URL could not be turned into a client
    #[error("Proxy configuration error: {0}")]
    Proxy(#[from] ProxyError),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// True when the provider could not be reached at all within the retry budget
    pub fn is_transport_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Transport(
                TransportError::MaxRetriesExceeded { .. }
            ))
        )
    }
}

/// Failure reading addresses from a local interface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The interface does not exist
    #[error("interface {0} not found")]
    NotFound(String),

    /// The interface exists but carries no usable IPv6 address
    #[error("no global IPv6 address found on interface {0}")]
    NoGlobalAddress(String),

    /// The OS refused the query
    #[error("permission denied querying interface {interface}: {detail}")]
    Permission {
        /// Interface name
        interface: String,
        /// OS error text
        detail: String,
    },

    /// Anything else (socket errors, command failures, unparsable output)
    #[error("{0}")]
    Other(String),
}

impl DiscoveryError {
    /// Map an I/O error raised while querying `interface`
    pub fn from_io(interface: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Permission {
                interface: interface.to_string(),
                detail: err.to_string(),
            },
            _ => Self::Other(format!("querying interface {interface}: {err}")),
        }
    }
}

/// Failure of the remote "what is my IP" probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Neither `get_ip.url` nor `get_ip.urls` is configured
    #[error("no IP echo URL configured in 'get_ip.urls' or 'get_ip.url'")]
    NoUrlsConfigured,

    /// Every URL exhausted its attempts (or the shared deadline expired)
    #[error("all {attempted} IP echo URL(s) failed, last error: {last_error}")]
    AllFailed {
        /// Number of URLs dispatched
        attempted: usize,
        /// Last failure observed, for diagnostics
        last_error: String,
    },
}

/// Proxy URL problems detected while building a client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Unparsable URL or missing scheme
    #[error("invalid proxy URL '{url}': {reason}")]
    InvalidProxyUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Scheme other than http, https, socks5, socks5h
    #[error("unsupported proxy scheme '{0}' (supported: http, https, socks5, socks5h)")]
    UnsupportedProxyScheme(String),

    /// The HTTP client builder rejected the configuration
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Transport-level failures (no usable HTTP response)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A single attempt failed before a response arrived
    #[error("request failed: {0}")]
    Request(String),

    /// Every attempt in the retry budget failed at the transport level
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Total attempts made
        attempts: u32,
        /// Last transport error
        last: String,
    },
}

/// Errors reported by a DNS provider client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The zone lookup succeeded but returned no zone
    #[error("zone {zone} not found: {message}")]
    ZoneNotFound {
        /// Zone name that was looked up
        zone: String,
        /// Provider message, or "unknown error"
        message: String,
    },

    /// The provider answered `success: false`
    #[error("API error (code {code}): {message}")]
    Api {
        /// Provider error code
        code: i64,
        /// Provider error message
        message: String,
    },

    /// The record search could not be completed
    #[error("failed to search existing DNS record: {0}")]
    SearchFailed(String),

    /// The provider could not be reached
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body did not match the expected shape
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
