// # ddns6 - one-shot IPv6 DDNS updater
//
// Thin integration layer: reads the environment, installs logging, wires the
// platform reader, remote probe, Cloudflare provider and stores into a
// `SyncEngine`, runs it once and maps the result to an exit code. All DDNS
// logic lives in ddns6-core.
//
// ## Environment
//
// - `DDNS6_CONFIG`: path to the JSON settings file (required)
// - `DDNS6_FORCE`: `1` or `true` to publish even if the cache matches
// - `DDNS6_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DDNS6_MODE`: `dry-run` to search without writing anything
//
// ## Example
//
// ```bash
// export DDNS6_CONFIG=/etc/ddns6/settings.json
// ddns6
// ```
//
// `ddns6 --version` (or `-v`) prints the version and exits.

use anyhow::Result;
use ddns6_core::engine::is_config_error;
use ddns6_core::{
    FileStateStore, JsonSettingsStore, Settings, SyncEngine, SyncEvent, SyncOutcome,
};
use ddns6_ip_http::HttpProbe;
use ddns6_ip_iface::PlatformReader;
use ddns6_provider_cloudflare::CloudflareProvider;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Success (including the cache-write warning)
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process configuration from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    settings_path: PathBuf,
    force: bool,
    dry_run: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings_path = lookup("DDNS6_CONFIG")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "DDNS6_CONFIG is required. \
                    Set it via: export DDNS6_CONFIG=/etc/ddns6/settings.json"
                )
            })?;

        let force = lookup("DDNS6_FORCE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        let dry_run = lookup("DDNS6_MODE")
            .map(|v| v.trim().eq_ignore_ascii_case("dry-run"))
            .unwrap_or(false);

        Ok(Self {
            settings_path: PathBuf::from(settings_path),
            force,
            dry_run,
            log_level: lookup("DDNS6_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNS6_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    if env::args().skip(1).any(|a| a == "-v" || a == "--version") {
        println!("ddns6 {}", env!("CARGO_PKG_VERSION"));
        return DdnsExitCode::Success.into();
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(&config).await {
            Ok(outcome) => {
                report(&outcome);
                DdnsExitCode::Success
            }
            Err(e) if is_config_error(&e) => {
                error!("{}", e);
                DdnsExitCode::ConfigError
            }
            Err(e) => {
                error!("DDNS update failed: {}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Build the engine from settings and run it once
async fn run(config: &Config) -> ddns6_core::Result<SyncOutcome> {
    let mut settings = Settings::load(&config.settings_path).await?;
    let normalized = settings.normalize();
    settings.validate()?;

    let settings_store = JsonSettingsStore::new(&config.settings_path, settings.clone());
    if normalized && !config.dry_run {
        if let Err(e) = settings_store.persist().await {
            warn!("Failed to write normalized settings back: {}", e);
        }
    }

    let cache_path = settings.resolve_cache_path(&config.settings_path).await;
    debug!("Cache file: {}", cache_path.display());

    if config.dry_run {
        warn!("Running in DRY-RUN mode - no DNS record, cache or settings will be written");
    }

    let probe = HttpProbe::from_settings(&settings)?;
    let provider = CloudflareProvider::from_settings(&settings)?.dry_run(config.dry_run);

    let (engine, mut events) = SyncEngine::new(
        Box::new(PlatformReader::new()),
        Box::new(probe),
        Box::new(provider),
        Box::new(FileStateStore::new(cache_path)),
        &settings,
    )?;
    let engine = engine.with_settings_store(Box::new(settings_store));

    let drain = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let result = engine.run_once(config.force).await;

    // Closing the sender lets the drain task finish.
    drop(engine);
    if let Err(e) = drain.await {
        debug!("Event drain task ended abnormally: {}", e);
    }

    result
}

fn log_event(event: &SyncEvent) {
    debug!("sync event: {:?}", event);
}

fn report(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Unchanged { address } => info!("Nothing to do, {} is current", address),
        SyncOutcome::Published {
            address,
            previous,
            upsert,
        } => match previous {
            Some(previous) => info!("Published {} (was {}): {}", address, previous, upsert),
            None => info!("Published {}: {}", address, upsert),
        },
        SyncOutcome::PublishedCacheStale {
            address, error, ..
        } => warn!(
            "Published {}, but the cache could not be updated: {}",
            address, error
        ),
        SyncOutcome::DryRun { address } => info!("[DRY-RUN] Would publish {}", address),
    }
}
