// # HTTP IP Probe
//
// This crate asks remote "what is my IP" services for the host's public IPv6
// address.
//
// ## Purpose
//
// This is the **fallback address source**, used when no interface is
// configured or reading it failed.
//
// ## Architecture
//
// Every configured URL gets its own task. Each task retries its URL with a
// fixed delay and reports into one channel. The first accepted address wins;
// the rest of the tasks see the cancellation signal before their next attempt
// and stop. Their late results are discarded. One deadline bounds the whole
// probe.
//
// ```text
//  url 1 ──task──┐
//  url 2 ──task──┼──▶ mpsc ──▶ first Ok wins ──▶ cancel (watch) ──▶ losers stop
//  url 3 ──task──┘
// ```

use async_trait::async_trait;
use ddns6_core::address::{is_ipv4_mapped, is_private_or_local};
use ddns6_core::config::Settings;
use ddns6_core::error::{ProbeError, ProxyError};
use ddns6_core::traits::RemoteAddressSource;
use ddns6_core::transport::{
    DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpTransport, ReqwestTransport, RetryPolicy,
};
use ddns6_core::AddressRecord;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Default retries per URL after the first attempt
pub const DEFAULT_RETRIES: u32 = 2;

/// Default delay between attempts on one URL
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default deadline for the whole probe
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// Why one response body was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyRejection {
    /// No non-blank line that looks like an IPv6 literal
    NoAddressLine,
    /// The qualifying line did not parse as IPv6
    Invalid(String),
    /// IPv4-mapped address
    Ipv4Mapped(Ipv6Addr),
    /// Link-local, unique local or loopback
    NotPublic(Ipv6Addr),
}

impl std::fmt::Display for BodyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyRejection::NoAddressLine => f.write_str("no IPv6 address in response"),
            BodyRejection::Invalid(line) => write!(f, "invalid IPv6 address '{line}'"),
            BodyRejection::Ipv4Mapped(addr) => write!(f, "IPv4-mapped address {addr}"),
            BodyRejection::NotPublic(addr) => write!(f, "{addr} is not a public address"),
        }
    }
}

/// Extract the address from an echo service response
///
/// The first non-blank line that contains `:` and neither `<` nor `{` is the
/// only one considered; if it is not an acceptable public IPv6 address the
/// whole body is rejected.
pub fn parse_probe_body(body: &str) -> Result<Ipv6Addr, BodyRejection> {
    let line = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| l.contains(':') && !l.contains('<') && !l.contains('{'))
        .ok_or(BodyRejection::NoAddressLine)?;

    let address: Ipv6Addr = line
        .parse()
        .map_err(|_| BodyRejection::Invalid(line.to_string()))?;

    if is_ipv4_mapped(&address) {
        return Err(BodyRejection::Ipv4Mapped(address));
    }
    if is_private_or_local(&address) {
        return Err(BodyRejection::NotPublic(address));
    }
    Ok(address)
}

/// Remote probe over a set of echo URLs
#[derive(Clone)]
pub struct HttpProbe {
    transport: Arc<dyn HttpTransport>,
    urls: Vec<String>,
    policy: RetryPolicy,
    deadline: Duration,
    quiet: bool,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("urls", &self.urls)
            .field("policy", &self.policy)
            .field("deadline", &self.deadline)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl HttpProbe {
    /// Create a probe with default retry, delay and deadline
    pub fn new(transport: Arc<dyn HttpTransport>, urls: Vec<String>) -> Self {
        Self {
            transport,
            urls,
            policy: RetryPolicy {
                max_retries: DEFAULT_RETRIES,
                base_delay: DEFAULT_RETRY_DELAY,
                ..RetryPolicy::probe()
            },
            deadline: DEFAULT_DEADLINE,
            quiet: false,
        }
    }

    /// Build from settings: fallback URLs, proxy and engine tuning
    pub fn from_settings(settings: &Settings) -> Result<Self, ProxyError> {
        let transport = ReqwestTransport::new(settings.proxy_url(), DEFAULT_REQUEST_TIMEOUT)?;
        Ok(Self::new(Arc::new(transport), settings.fallback_urls())
            .with_retries(settings.engine.probe_retries)
            .with_retry_delay(settings.engine.probe_retry_delay())
            .with_deadline(settings.engine.probe_timeout()))
    }

    /// Retries per URL after the first attempt
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.policy.max_retries = retries;
        self
    }

    /// Fixed delay between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Deadline for the whole probe
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Suppress per-attempt logging
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// The URLs this probe dispatches, in order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

#[async_trait]
impl RemoteAddressSource for HttpProbe {
    async fn resolve(&self) -> Result<AddressRecord, ProbeError> {
        if self.urls.is_empty() {
            return Err(ProbeError::NoUrlsConfigured);
        }

        let deadline = Instant::now() + self.deadline;
        let (result_tx, mut result_rx) = mpsc::channel(self.urls.len());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        for url in &self.urls {
            let worker = UrlWorker {
                transport: Arc::clone(&self.transport),
                url: url.clone(),
                policy: self.policy,
                quiet: self.quiet,
            };
            let tx = result_tx.clone();
            let cancel = cancel_rx.clone();
            tokio::spawn(async move {
                let result = worker.run(cancel).await;
                // Receiver is gone once a winner was picked or the deadline hit.
                let _ = tx.send((worker.url, result)).await;
            });
        }
        drop(result_tx);

        let attempted = self.urls.len();
        let mut last_error = String::from("no response");

        loop {
            match tokio::time::timeout_at(deadline, result_rx.recv()).await {
                Ok(Some((url, Ok(address)))) => {
                    let _ = cancel_tx.send(true);
                    if !self.quiet {
                        tracing::info!("Fallback URL {} succeeded: {}", url, address);
                    }
                    return AddressRecord::without_lease(address).ok_or_else(|| {
                        ProbeError::AllFailed {
                            attempted,
                            last_error: format!("{url} returned an IPv4-mapped address"),
                        }
                    });
                }
                Ok(Some((url, Err(error)))) => {
                    if !self.quiet {
                        tracing::warn!("Fallback URL {} failed: {}", url, error);
                    }
                    last_error = format!("{url}: {error}");
                }
                Ok(None) => break,
                Err(_) => {
                    let _ = cancel_tx.send(true);
                    last_error = format!("probe deadline of {:?} exceeded", self.deadline);
                    break;
                }
            }
        }

        if !self.quiet {
            tracing::error!(
                "All fallback URLs failed. Tried {} URL(s): {:?}",
                attempted,
                self.urls
            );
        }
        Err(ProbeError::AllFailed {
            attempted,
            last_error,
        })
    }
}

/// One URL's retry loop
struct UrlWorker {
    transport: Arc<dyn HttpTransport>,
    url: String,
    policy: RetryPolicy,
    quiet: bool,
}

impl UrlWorker {
    async fn run(&self, mut cancel: watch::Receiver<bool>) -> Result<Ipv6Addr, String> {
        let attempts = self.policy.attempts();
        let request = HttpRequest::get(&self.url);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if *cancel.borrow() {
                return Err("cancelled".into());
            }

            if !self.quiet {
                tracing::info!(
                    "Trying fallback URL {} (attempt {}/{})",
                    self.url,
                    attempt + 1,
                    attempts
                );
            }

            match self.transport.send(&request).await {
                Ok(reply) if !self.policy.should_retry(&reply) => {
                    return parse_probe_body(&reply.body).map_err(|e| e.to_string());
                }
                Ok(reply) => last_error = format!("returned status {}", reply.status),
                Err(e) => last_error = e.to_string(),
            }

            if attempt + 1 < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.delay_after(attempt)) => {}
                    _ = cancel.changed() => return Err("cancelled".into()),
                }
            }
        }

        Err(last_error)
    }
}
