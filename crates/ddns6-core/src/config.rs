//! Configuration types for the DDNS system
//!
//! The settings file is JSON:
//!
//! ```json
//! {
//!   "provider": "cloudflare",
//!   "get_ip": { "interface": "eth0", "urls": ["https://api6.ipify.org"] },
//!   "work_dir": "/var/lib/ddns6",
//!   "proxy": "socks5://127.0.0.1:1080",
//!   "provider_options": {
//!     "api_token": "...",
//!     "zone_id": "",
//!     "proxied": false,
//!     "ttl": 180,
//!     "domain": { "zone": "example.com", "record": "home" }
//!   }
//! }
//! ```
//!
//! Unknown top-level keys are kept and written back untouched.

use crate::error::{Error, Result};
use crate::state::file::CACHE_FILE_NAME;
use crate::transport::ProxyMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TTL applied when the settings leave it at 0
pub const DEFAULT_TTL: u32 = 180;

/// Only provider currently supported
pub const PROVIDER_CLOUDFLARE: &str = "cloudflare";

/// Main settings object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// DNS provider name
    #[serde(default)]
    pub provider: String,

    /// Where to look for the address
    #[serde(default)]
    pub get_ip: GetIpSettings,

    /// Directory holding the cache file (empty: next to the settings file)
    #[serde(default)]
    pub work_dir: String,

    /// Optional proxy URL for every outbound HTTP request
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy: String,

    /// Provider credentials and record definition
    pub provider_options: ProviderOptions,

    /// Engine and probe tuning
    #[serde(default, skip_serializing_if = "EngineSettings::is_default")]
    pub engine: EngineSettings,

    /// Keys this version does not know about
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Address acquisition settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetIpSettings {
    /// Interface to read addresses from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,

    /// Single fallback URL (older layout)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Ordered fallback URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// Provider-specific settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// API token (bearer)
    #[serde(default)]
    pub api_token: String,

    /// Cached zone id, filled in after the first lookup
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone_id: String,

    /// Provider-side proxying flag
    #[serde(default)]
    pub proxied: bool,

    /// Record TTL in seconds; 0 means [`DEFAULT_TTL`]
    #[serde(default)]
    pub ttl: u32,

    /// Zone and record names
    #[serde(default)]
    pub domain: DomainSettings,
}

impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("api_token", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .field("proxied", &self.proxied)
            .field("ttl", &self.ttl)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Zone and record names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSettings {
    /// Zone name, e.g. `example.com`
    #[serde(default)]
    pub zone: String,

    /// Record label inside the zone, e.g. `home`
    #[serde(default)]
    pub record: String,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Capacity of the sync event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Retries per probe URL after the first attempt
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,

    /// Fixed delay between probe attempts (in seconds)
    #[serde(default = "default_probe_retry_delay_secs")]
    pub probe_retry_delay_secs: u64,

    /// Shared deadline for the whole probe (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl EngineSettings {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Probe retry delay as a [`Duration`]
    pub fn probe_retry_delay(&self) -> Duration {
        Duration::from_secs(self.probe_retry_delay_secs)
    }

    /// Probe deadline as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            probe_retries: default_probe_retries(),
            probe_retry_delay_secs: default_probe_retry_delay_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    64
}

fn default_probe_retries() -> u32 {
    2
}

fn default_probe_retry_delay_secs() -> u64 {
    2
}

fn default_probe_timeout_secs() -> u64 {
    15
}

impl Settings {
    /// Parse settings from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid settings JSON: {e}")))
    }

    /// Read and parse a settings file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!(
                "failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Serialize for writing back to disk
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.provider.is_empty() {
            return Err(Error::config("'provider' is required"));
        }
        if self.provider != PROVIDER_CLOUDFLARE {
            return Err(Error::config(format!(
                "unsupported provider '{}' (supported: {})",
                self.provider, PROVIDER_CLOUDFLARE
            )));
        }

        if self.get_ip.interface.is_empty() && self.fallback_urls().is_empty() {
            return Err(Error::config(
                "'get_ip' needs an 'interface' or at least one of 'url'/'urls'",
            ));
        }

        let options = &self.provider_options;
        if options.api_token.is_empty() {
            return Err(Error::config("'provider_options.api_token' cannot be empty"));
        }
        if options.domain.zone.is_empty() || options.domain.record.is_empty() {
            return Err(Error::config(
                "'provider_options.domain.zone' and 'provider_options.domain.record' are required",
            ));
        }

        ProxyMode::parse(self.proxy_url())
            .map_err(|e| Error::config(format!("'proxy': {e}")))?;

        if self.engine.event_channel_capacity == 0 {
            return Err(Error::config("'engine.event_channel_capacity' must be > 0"));
        }

        Ok(())
    }

    /// Fill in defaults; returns true if anything changed
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;

        if self.provider_options.ttl == 0 {
            tracing::info!("TTL not set, using default of {}s", DEFAULT_TTL);
            self.provider_options.ttl = DEFAULT_TTL;
            changed = true;
        }

        changed
    }

    /// Fallback URLs: `urls` when it lists any, otherwise the legacy `url`
    pub fn fallback_urls(&self) -> Vec<String> {
        let listed = dedup_urls(self.get_ip.urls.iter());
        if !listed.is_empty() {
            return listed;
        }
        dedup_urls(std::iter::once(&self.get_ip.url))
    }

    /// Configured interface, if any
    pub fn interface(&self) -> Option<&str> {
        Some(self.get_ip.interface.trim()).filter(|i| !i.is_empty())
    }

    /// Configured proxy URL, if any
    pub fn proxy_url(&self) -> Option<&str> {
        Some(self.proxy.trim()).filter(|p| !p.is_empty())
    }

    /// Cached zone id, if any
    pub fn zone_id(&self) -> Option<&str> {
        Some(self.provider_options.zone_id.as_str()).filter(|z| !z.is_empty())
    }

    /// `record.zone`
    pub fn fqdn(&self) -> String {
        format!(
            "{}.{}",
            self.provider_options.domain.record, self.provider_options.domain.zone
        )
    }

    /// Effective TTL (0 maps to [`DEFAULT_TTL`])
    pub fn ttl(&self) -> u32 {
        match self.provider_options.ttl {
            0 => DEFAULT_TTL,
            ttl => ttl,
        }
    }

    /// Where the cache file lives
    ///
    /// `<work_dir>/cache.lastip` when `work_dir` is set and can be created,
    /// otherwise `cache.lastip` next to the settings file.
    pub async fn resolve_cache_path(&self, settings_path: &Path) -> PathBuf {
        let settings_dir = settings_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let work_dir = self.work_dir.trim();
        if !work_dir.is_empty() {
            match tokio::fs::create_dir_all(work_dir).await {
                Ok(()) => return Path::new(work_dir).join(CACHE_FILE_NAME),
                Err(e) => tracing::warn!(
                    "Failed to create work_dir '{}': {}. Falling back to {}",
                    work_dir,
                    e,
                    settings_dir.display()
                ),
            }
        }

        settings_dir.join(CACHE_FILE_NAME)
    }
}

/// Trimmed, non-blank, first occurrence wins
fn dedup_urls<'a>(candidates: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for url in candidates {
        let url = url.trim();
        if !url.is_empty() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}
