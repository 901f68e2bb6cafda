// # Cloudflare DNS Provider
//
// Keeps one AAAA record in a Cloudflare zone in sync through API v4.
//
// ## Behaviour
//
// - Zone lookup: `GET /zones?name=<zone>`
// - Record search: `GET /zones/<id>/dns_records?type=AAAA&name=<fqdn>`
// - Identical record (content, TTL, proxied): no write
// - Differing record: `PUT /zones/<id>/dns_records/<record id>`
// - Missing record: `POST /zones/<id>/dns_records`
// - Dry-run: lookups happen, writes are logged and skipped
//
// Every request carries the bearer token and goes through a
// [`ResilientClient`] with the provider retry policy (transport errors and
// 5xx are retried with doubling backoff). Any `success: false` envelope is
// surfaced as [`ProviderError::Api`] with the first error code and message.
//
// ## Security
//
// The API token never appears in logs or `Debug` output.
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/

use async_trait::async_trait;
use ddns6_core::config::Settings;
use ddns6_core::error::{ProviderError, ProxyError, TransportError};
use ddns6_core::traits::{DnsProvider, RecordSpec, UpsertOutcome};
use ddns6_core::transport::{HttpReply, HttpRequest, ResilientClient, RetryPolicy};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::Ipv6Addr;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Standard response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> Envelope<T> {
    /// First error as `(code, message)`
    fn first_error(&self) -> (i64, String) {
        self.errors
            .first()
            .map(|e| (e.code, e.message.clone()))
            .unwrap_or_else(|| (0, "unknown error".to_string()))
    }

    fn api_error(&self) -> ProviderError {
        let (code, message) = self.first_error();
        ProviderError::Api { code, message }
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    proxied: bool,
    #[serde(default)]
    ttl: u32,
}

impl DnsRecord {
    fn matches(&self, spec: &RecordSpec) -> bool {
        let same_content = self
            .content
            .parse::<Ipv6Addr>()
            .map(|current| current == spec.address)
            .unwrap_or(false);
        same_content && self.proxied == spec.proxied && self.ttl == spec.ttl
    }
}

#[derive(Debug, Deserialize)]
struct WrittenRecord {
    #[serde(default)]
    id: String,
}

/// Decode an envelope, describing the reply when the body is not JSON
fn decode<T: DeserializeOwned>(reply: &HttpReply) -> Result<Envelope<T>, String> {
    serde_json::from_str(&reply.body).map_err(|e| {
        if reply.is_success() {
            format!("failed to decode response: {e}")
        } else {
            format!("HTTP {} with undecodable body: {e}", reply.status)
        }
    })
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is set the provider still resolves the zone and searches
/// for the record, then logs the write it would have made and returns
/// [`UpsertOutcome::DryRun`].
#[derive(Clone)]
pub struct CloudflareProvider {
    client: ResilientClient,
    api_base: String,
    api_token: String,
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_base", &self.api_base)
            .field("api_token", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .field("client", &self.client)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider on top of an existing client
    pub fn new(client: ResilientClient, api_token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            api_token: api_token.into(),
            dry_run: false,
        }
    }

    /// Build from settings: token, proxy and the provider retry policy
    pub fn from_settings(settings: &Settings) -> Result<Self, ProxyError> {
        let client = ResilientClient::with_proxy(settings.proxy_url(), RetryPolicy::provider())?;
        Ok(Self::new(client, settings.provider_options.api_token.clone()))
    }

    /// Point at a different API root (tests, API gateways)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable or disable dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<String, TransportError> {
        let raw = format!("{}{}", self.api_base, path);
        let url = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        url.map(String::from)
            .map_err(|e| TransportError::Request(format!("invalid API URL {raw}: {e}")))
    }

    async fn call(&self, method: Method, url: String) -> Result<HttpReply, TransportError> {
        let request = HttpRequest::new(method, url).with_bearer(self.api_token.clone());
        self.client.request(&request).await
    }

    async fn search_record(
        &self,
        zone_id: &str,
        record: &RecordSpec,
    ) -> Result<Option<DnsRecord>, ProviderError> {
        let url = self
            .endpoint(
                &format!("/zones/{zone_id}/dns_records"),
                &[("type", RecordSpec::RECORD_TYPE), ("name", record.fqdn.as_str())],
            )
            .map_err(|e| ProviderError::SearchFailed(e.to_string()))?;

        let reply = self
            .call(Method::GET, url)
            .await
            .map_err(|e| ProviderError::SearchFailed(e.to_string()))?;
        let envelope: Envelope<Vec<DnsRecord>> =
            decode(&reply).map_err(ProviderError::SearchFailed)?;

        if !envelope.success {
            return Err(envelope.api_error());
        }

        Ok(envelope.result.unwrap_or_default().into_iter().next())
    }

    async fn write_record(
        &self,
        method: Method,
        url: String,
        record: &RecordSpec,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "type": RecordSpec::RECORD_TYPE,
            "name": record.fqdn,
            "content": record.address.to_string(),
            "ttl": record.ttl,
            "proxied": record.proxied,
        });
        let request = HttpRequest::new(method.clone(), url)
            .with_bearer(self.api_token.clone())
            .with_json(body);

        let reply = self.client.request(&request).await?;
        let envelope: Envelope<WrittenRecord> =
            decode(&reply).map_err(ProviderError::InvalidResponse)?;

        if !envelope.success {
            let error = envelope.api_error();
            tracing::error!("Cloudflare API {} failed: {}", method, error);
            return Err(error);
        }

        Ok(envelope.result.map(|r| r.id).unwrap_or_default())
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn resolve_zone_id(&self, zone: &str) -> Result<String, ProviderError> {
        tracing::debug!("Looking up zone ID for {}", zone);

        let url = self.endpoint("/zones", &[("name", zone)])?;
        let reply = self.call(Method::GET, url).await?;
        let envelope: Envelope<Vec<Zone>> =
            decode(&reply).map_err(ProviderError::InvalidResponse)?;

        if !envelope.success {
            if envelope.errors.is_empty() {
                return Err(ProviderError::ZoneNotFound {
                    zone: zone.to_string(),
                    message: "unknown error".to_string(),
                });
            }
            return Err(envelope.api_error());
        }

        let zone_id = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|z| z.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::ZoneNotFound {
                zone: zone.to_string(),
                message: "no zone with that name is visible to this token".to_string(),
            })?;

        tracing::debug!("Found zone ID: {}", zone_id);
        Ok(zone_id)
    }

    async fn upsert_record(
        &self,
        zone_id: &str,
        record: &RecordSpec,
    ) -> Result<UpsertOutcome, ProviderError> {
        tracing::info!(
            "Syncing Cloudflare record {} -> {} [mode: {}]",
            record.fqdn,
            record.address,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let existing = self.search_record(zone_id, record).await?;

        if let Some(current) = &existing {
            if current.matches(record) {
                tracing::info!(
                    "DNS record already has correct IP: {} -> {}",
                    record.fqdn,
                    record.address
                );
                return Ok(UpsertOutcome::Unchanged {
                    record_id: current.id.clone(),
                });
            }
        }

        let collection = format!("/zones/{zone_id}/dns_records");
        let (method, url) = match &existing {
            Some(current) => (
                Method::PUT,
                self.endpoint(&format!("{collection}/{}", current.id), &[])?,
            ),
            None => (Method::POST, self.endpoint(&collection, &[])?),
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} {} for {} with content {}",
                method,
                url,
                record.fqdn,
                record.address
            );
            return Ok(UpsertOutcome::DryRun {
                would_create: existing.is_none(),
            });
        }

        match existing {
            Some(current) => {
                let record_id = self.write_record(method, url, record).await?;
                let record_id = if record_id.is_empty() {
                    current.id
                } else {
                    record_id
                };
                tracing::info!(
                    "DNS record updated: {} -> {} (was: {})",
                    record.fqdn,
                    record.address,
                    current.content
                );
                Ok(UpsertOutcome::Updated {
                    record_id,
                    previous_content: current.content,
                })
            }
            None => {
                let record_id = self.write_record(method, url, record).await?;
                tracing::info!("DNS record created: {} -> {}", record.fqdn, record.address);
                Ok(UpsertOutcome::Created { record_id })
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns6_core::transport::HttpTransport;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    const BASE: &str = "https://cf.example.test/client/v4";
    const TOKEN: &str = "secret-token-12345";

    /// Replays scripted replies and records every request
    #[derive(Default)]
    struct ScriptedApi {
        replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        requests: Mutex<Vec<(HttpRequest, Instant)>>,
    }

    impl ScriptedApi {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(r, _)| r.clone())
                .collect()
        }

        fn times(&self) -> Vec<Instant> {
            self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedApi {
        async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
            self.requests
                .lock()
                .unwrap()
                .push((request.clone(), Instant::now()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
        }
    }

    fn json(status: u16, body: serde_json::Value) -> Result<HttpReply, TransportError> {
        Ok(HttpReply::new(status, body.to_string()))
    }

    fn provider(api: &Arc<ScriptedApi>) -> CloudflareProvider {
        let transport: Arc<dyn HttpTransport> = api.clone();
        CloudflareProvider::new(ResilientClient::new(transport, RetryPolicy::provider()), TOKEN)
            .with_api_base(BASE)
    }

    fn spec() -> RecordSpec {
        RecordSpec {
            fqdn: "home.example.com".into(),
            address: "2001:db8::5".parse().unwrap(),
            ttl: 180,
            proxied: false,
        }
    }

    fn search_result(records: serde_json::Value) -> Result<HttpReply, TransportError> {
        json(
            200,
            serde_json::json!({ "success": true, "errors": [], "result": records }),
        )
    }

    fn written(id: &str) -> Result<HttpReply, TransportError> {
        json(
            200,
            serde_json::json!({ "success": true, "errors": [], "result": { "id": id } }),
        )
    }

    #[tokio::test]
    async fn zone_lookup_returns_first_id() {
        let api = ScriptedApi::new(vec![json(
            200,
            serde_json::json!({
                "success": true,
                "errors": [],
                "result": [{ "id": "zone-abc", "name": "example.com" }]
            }),
        )]);

        let zone_id = provider(&api).resolve_zone_id("example.com").await.unwrap();

        assert_eq!(zone_id, "zone-abc");
        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, format!("{BASE}/zones?name=example.com"));
        assert_eq!(requests[0].bearer_token.as_deref(), Some(TOKEN));
    }

    #[tokio::test]
    async fn empty_zone_result_is_not_found() {
        let api = ScriptedApi::new(vec![search_result(serde_json::json!([]))]);

        let err = provider(&api).resolve_zone_id("example.com").await.unwrap_err();

        assert!(matches!(err, ProviderError::ZoneNotFound { ref zone, .. } if zone == "example.com"));
    }

    #[tokio::test]
    async fn zone_api_error_is_not_retried() {
        let api = ScriptedApi::new(vec![json(
            403,
            serde_json::json!({
                "success": false,
                "errors": [{ "code": 9109, "message": "Invalid access token" }],
                "result": null
            }),
        )]);

        let err = provider(&api).resolve_zone_id("example.com").await.unwrap_err();

        assert_eq!(
            err,
            ProviderError::Api {
                code: 9109,
                message: "Invalid access token".into()
            }
        );
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zone_lookup_exhausts_retries_on_transport_errors() {
        let refused = || Err(TransportError::Request("connection refused".into()));
        let api = ScriptedApi::new(vec![refused(), refused(), refused(), refused()]);

        let err = provider(&api).resolve_zone_id("example.com").await.unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Transport(TransportError::MaxRetriesExceeded { attempts: 4, .. })
        ));
        let times = api.times();
        assert_eq!(times.len(), 4);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
        assert_eq!(times[3] - times[2], Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_record_is_created() {
        let api = ScriptedApi::new(vec![search_result(serde_json::json!([])), written("rec-new")]);

        let outcome = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Created {
                record_id: "rec-new".into()
            }
        );
        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].url,
            format!("{BASE}/zones/zone-abc/dns_records?type=AAAA&name=home.example.com")
        );
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].url, format!("{BASE}/zones/zone-abc/dns_records"));
        assert_eq!(requests[1].bearer_token.as_deref(), Some(TOKEN));
        assert_eq!(
            requests[1].body,
            Some(serde_json::json!({
                "type": "AAAA",
                "name": "home.example.com",
                "content": "2001:db8::5",
                "ttl": 180,
                "proxied": false
            }))
        );
    }

    #[tokio::test]
    async fn differing_record_is_replaced() {
        let api = ScriptedApi::new(vec![
            search_result(serde_json::json!([
                { "id": "rec-1", "content": "2001:db8::4", "proxied": false, "ttl": 180 }
            ])),
            written("rec-1"),
        ]);

        let outcome = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Updated {
                record_id: "rec-1".into(),
                previous_content: "2001:db8::4".into()
            }
        );
        let requests = api.requests();
        assert_eq!(requests[1].method, Method::PUT);
        assert_eq!(requests[1].url, format!("{BASE}/zones/zone-abc/dns_records/rec-1"));
    }

    #[tokio::test]
    async fn flag_or_ttl_difference_also_replaces() {
        for existing in [
            serde_json::json!({ "id": "rec-1", "content": "2001:db8::5", "proxied": true, "ttl": 180 }),
            serde_json::json!({ "id": "rec-1", "content": "2001:db8::5", "proxied": false, "ttl": 1 }),
        ] {
            let api = ScriptedApi::new(vec![
                search_result(serde_json::json!([existing])),
                written("rec-1"),
            ]);

            let outcome = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap();

            assert!(matches!(outcome, UpsertOutcome::Updated { .. }));
            assert_eq!(api.requests().len(), 2);
        }
    }

    #[tokio::test]
    async fn identical_record_is_left_alone() {
        let api = ScriptedApi::new(vec![search_result(serde_json::json!([
            { "id": "rec-1", "content": "2001:0db8:0::5", "proxied": false, "ttl": 180 }
        ]))]);

        let outcome = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap();

        assert_eq!(
            outcome,
            UpsertOutcome::Unchanged {
                record_id: "rec-1".into()
            }
        );
        assert_eq!(api.requests().len(), 1, "search only, no write");
    }

    #[tokio::test]
    async fn dry_run_searches_but_does_not_write() {
        let api = ScriptedApi::new(vec![search_result(serde_json::json!([
            { "id": "rec-1", "content": "2001:db8::4", "proxied": false, "ttl": 180 }
        ]))]);

        let outcome = provider(&api)
            .dry_run(true)
            .upsert_record("zone-abc", &spec())
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::DryRun { would_create: false });
        assert!(!outcome.is_confirmed());
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_search_surfaces_api_error() {
        let api = ScriptedApi::new(vec![json(
            400,
            serde_json::json!({
                "success": false,
                "errors": [{ "code": 7003, "message": "Could not route to /zones/bad" }]
            }),
        )]);

        let err = provider(&api).upsert_record("bad", &spec()).await.unwrap_err();

        assert_eq!(
            err,
            ProviderError::Api {
                code: 7003,
                message: "Could not route to /zones/bad".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn search_server_errors_are_retried_then_fail() {
        let bad_gateway = || Ok(HttpReply::new(502, "<html>bad gateway</html>"));
        let api = ScriptedApi::new(vec![bad_gateway(), bad_gateway(), bad_gateway(), bad_gateway()]);

        let err = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap_err();

        assert!(matches!(err, ProviderError::SearchFailed(ref m) if m.contains("HTTP 502")));
        assert_eq!(api.requests().len(), 4);
    }

    #[tokio::test]
    async fn rejected_write_surfaces_api_error() {
        let api = ScriptedApi::new(vec![
            search_result(serde_json::json!([])),
            json(
                400,
                serde_json::json!({
                    "success": false,
                    "errors": [{ "code": 81057, "message": "Record already exists." }]
                }),
            ),
        ]);

        let err = provider(&api).upsert_record("zone-abc", &spec()).await.unwrap_err();

        assert_eq!(
            err,
            ProviderError::Api {
                code: 81057,
                message: "Record already exists.".into()
            }
        );
    }

    #[test]
    fn api_token_not_exposed_in_debug() {
        let api = ScriptedApi::new(Vec::new());
        let debug = format!("{:?}", provider(&api));

        assert!(!debug.contains(TOKEN));
        assert!(debug.contains("CloudflareProvider"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn settings_build_a_live_provider() {
        let settings = Settings::from_json(
            r#"{
                "provider": "cloudflare",
                "get_ip": { "interface": "eth0" },
                "provider_options": {
                    "api_token": "tok",
                    "domain": { "zone": "example.com", "record": "home" }
                }
            }"#,
        )
        .unwrap();

        let provider = CloudflareProvider::from_settings(&settings).unwrap();

        assert!(!provider.is_dry_run());
        assert_eq!(provider.api_base, CLOUDFLARE_API_BASE);
        assert_eq!(provider.provider_name(), "cloudflare");
    }

    #[test]
    fn dry_run_flag_is_visible_through_the_trait() {
        let api = ScriptedApi::new(vec![]);
        let live: Box<dyn DnsProvider> = Box::new(provider(&api));
        let dry: Box<dyn DnsProvider> = Box::new(provider(&api).dry_run(true));

        assert!(!live.is_dry_run());
        assert!(dry.is_dry_run());
    }
}
