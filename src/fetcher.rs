use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::keys::{ApiKey, KeyRegistry};
use crate::metrics::{KEY_ROTATIONS, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::quota::QuotaTracker;
use crate::signature::QueryParams;
use crate::telemetry::{RotationReason, TelemetryEvent, TelemetrySink};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

// How a single attempt with a single key ended
#[derive(Debug)]
enum AttemptOutcome {
    Success(Value),
    Exhausted(Option<String>),
    Rejected(StatusCode),
    Transport(String),
}

/// Issues upstream calls, rotating keys on transport errors and 403s.
///
/// Expected failures never surface as errors: `request` answers `None`.
pub struct ResilientFetcher {
    client: reqwest::Client,
    base_url: String,
    registry: Arc<KeyRegistry>,
    quota: Arc<QuotaTracker>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ResilientFetcher {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        registry: Arc<KeyRegistry>,
        quota: Arc<QuotaTracker>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            registry,
            quota,
            telemetry,
        })
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub async fn request(&self, endpoint: Endpoint, params: &QueryParams) -> Option<Value> {
        let attempts = self.registry.len();
        let mut last_key: Option<Arc<ApiKey>> = None;
        // refused for this request only
        let mut refused: HashSet<String> = HashSet::new();

        for attempt in 1..=attempts {
            let Some(key) = self.select_key(&refused) else {
                if self.registry.exhausted_count() == attempts {
                    tracing::warn!("No usable api key left for {}", endpoint);
                    self.telemetry.emit(TelemetryEvent::KeysExhausted { endpoint });
                }
                break;
            };
            last_key = Some(Arc::clone(&key));

            match self.attempt(endpoint, params, &key, attempt).await {
                AttemptOutcome::Success(payload) => {
                    self.bill(endpoint, &key);
                    return Some(payload);
                }
                AttemptOutcome::Exhausted(reason) => {
                    let reason = reason.as_deref().unwrap_or("unknown");
                    if is_key_level(reason) {
                        tracing::warn!(
                            "Key {} refused for {} (reason: {}), marking exhausted",
                            key.id,
                            endpoint,
                            reason
                        );
                        self.registry.mark_exhausted(&key);
                    } else {
                        tracing::warn!(
                            "Key {} refused for {} (reason: {}), skipping it for this request",
                            key.id,
                            endpoint,
                            reason
                        );
                    }
                    refused.insert(key.id.clone());
                    self.rotate_from(&key, RotationReason::Exhausted);
                }
                AttemptOutcome::Rejected(status) => {
                    // retrying with another key cannot fix a bad request
                    tracing::warn!("{} rejected with {}, not retrying", endpoint, status);
                    self.bill(endpoint, &key);
                    return None;
                }
                AttemptOutcome::Transport(error) => {
                    tracing::warn!("{} failed with key {}: {}", endpoint, key.id, error);
                    self.rotate_from(&key, RotationReason::Transport);
                }
            }
        }

        if let Some(key) = last_key {
            tracing::warn!("{} failed on every key", endpoint);
            self.bill(endpoint, &key);
        }
        None
    }

    /// Current key, rotating past keys that are exhausted or were already
    /// refused during this request. Leaves the cursor alone when the current
    /// key is usable.
    fn select_key(&self, refused: &HashSet<String>) -> Option<Arc<ApiKey>> {
        for _ in 0..self.registry.len() {
            let key = self.registry.current_key();
            if !key.is_exhausted() && !refused.contains(&key.id) {
                return Some(key);
            }
            self.rotate_from(&key, RotationReason::Exhausted);
        }
        None
    }

    async fn attempt(
        &self,
        endpoint: Endpoint,
        params: &QueryParams,
        key: &ApiKey,
        attempt: usize,
    ) -> AttemptOutcome {
        let url = match self.build_url(endpoint, params, key) {
            Ok(url) => url,
            Err(e) => return AttemptOutcome::Transport(e.to_string()),
        };

        self.telemetry.emit(TelemetryEvent::RequestStart {
            endpoint,
            key_id: key.id.clone(),
            attempt,
        });
        REQUEST_TOTAL.inc();

        let started = Instant::now();
        let result = self.client.get(url).send().await;
        let latency = started.elapsed();
        REQUEST_LATENCY.observe(latency.as_secs_f64());

        self.telemetry.emit(TelemetryEvent::RequestEnd {
            endpoint,
            key_id: key.id.clone(),
            status: result.as_ref().ok().map(|res| res.status().as_u16()),
            latency,
        });

        let res = match result {
            Ok(res) => res,
            // the url carries the key, keep it out of logs
            Err(e) => return AttemptOutcome::Transport(e.without_url().to_string()),
        };

        match res.status() {
            StatusCode::OK => match res.json::<Value>().await {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(e) if e.is_decode() => {
                    tracing::warn!("Unreadable {} payload: {}", endpoint, e.without_url());
                    AttemptOutcome::Rejected(StatusCode::OK)
                }
                Err(e) => AttemptOutcome::Transport(e.without_url().to_string()),
            },
            StatusCode::FORBIDDEN => {
                let body = res.text().await.unwrap_or_default();
                AttemptOutcome::Exhausted(error_reason(&body))
            }
            status => AttemptOutcome::Rejected(status),
        }
    }

    fn build_url(
        &self,
        endpoint: Endpoint,
        params: &QueryParams,
        key: &ApiKey,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint.path()))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair("key", key.secret());
        Ok(url)
    }

    fn rotate_from(&self, key: &ApiKey, reason: RotationReason) {
        let next = self.registry.advance_past(key);
        KEY_ROTATIONS.inc();
        self.telemetry.emit(TelemetryEvent::KeyRotated {
            from: key.id.clone(),
            to: next.id.clone(),
            reason,
        });
    }

    fn bill(&self, endpoint: Endpoint, key: &ApiKey) {
        let key_total = self.quota.record(endpoint, &key.id);
        self.telemetry.emit(TelemetryEvent::QuotaIncrement {
            key_id: key.id.clone(),
            endpoint,
            cost: endpoint.cost(),
            key_total,
        });
    }
}

// 403 reasons that mean the key itself is spent or unusable, not the resource
const KEY_LEVEL_REASONS: [&str; 9] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "keyInvalid",
    "keyExpired",
    "accessNotConfigured",
    "ipRefererBlocked",
    "dailyLimitExceededUnreg",
];

fn is_key_level(reason: &str) -> bool {
    KEY_LEVEL_REASONS.contains(&reason)
}

// First `error.errors[].reason` of an upstream error body, e.g. "quotaExceeded"
fn error_reason(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .pointer("/error/errors/0/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{NoopSink, RecordingSink};

    fn fetcher(base: &str) -> Result<ResilientFetcher, ConfigError> {
        ResilientFetcher::new(
            reqwest::Client::new(),
            base,
            Arc::new(KeyRegistry::new(["k1"]).unwrap()),
            Arc::new(QuotaTracker::new()),
            Arc::new(NoopSink),
        )
    }

    fn recorded(keys: &[&str]) -> (ResilientFetcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let fetcher = ResilientFetcher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Arc::new(KeyRegistry::new(keys.iter().copied()).unwrap()),
            Arc::new(QuotaTracker::new()),
            sink.clone(),
        )
        .unwrap();
        (fetcher, sink)
    }

    #[test]
    fn skipping_an_exhausted_key_is_reported_as_rotation() {
        let (fetcher, sink) = recorded(&["a", "b", "c"]);
        let registry = fetcher.registry();
        registry.mark_exhausted(&registry.current_key());

        let key = fetcher.select_key(&HashSet::new()).unwrap();
        assert_eq!(key.id, "key-2");
        assert_eq!(
            sink.events(),
            [TelemetryEvent::KeyRotated {
                from: "key-1".to_string(),
                to: "key-2".to_string(),
                reason: RotationReason::Exhausted,
            }]
        );
    }

    #[test]
    fn select_key_honours_per_request_refusals() {
        let (fetcher, sink) = recorded(&["a", "b"]);

        let untouched = fetcher.select_key(&HashSet::new()).unwrap();
        assert_eq!(untouched.id, "key-1");
        assert!(sink.events().is_empty());

        let refused: HashSet<String> = ["key-1", "key-2"].iter().map(|s| s.to_string()).collect();
        assert!(fetcher.select_key(&refused).is_none());
        assert_eq!(fetcher.registry().exhausted_count(), 0);
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            fetcher("not a url"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn url_carries_params_and_key() {
        let fetcher = fetcher("https://api.example.com/v3/").unwrap();
        let mut params = QueryParams::new();
        params.insert("part", "snippet".to_string());
        params.insert("q", "lo fi".to_string());

        let key = fetcher.registry().current_key();
        let url = fetcher.build_url(Endpoint::Search, &params, &key).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v3/search?part=snippet&q=lo+fi&key=k1"
        );
    }

    #[test]
    fn reads_reason_from_error_body() {
        let body = r#"{"error":{"code":403,"errors":[{"reason":"quotaExceeded"}]}}"#;
        assert_eq!(error_reason(body).as_deref(), Some("quotaExceeded"));
        assert_eq!(error_reason("<html>"), None);
    }

    #[test]
    fn only_quota_and_key_reasons_are_key_level() {
        assert!(is_key_level("quotaExceeded"));
        assert!(is_key_level("keyInvalid"));
        assert!(!is_key_level("playlistItemsNotAccessible"));
        assert!(!is_key_level("forbidden"));
        assert!(!is_key_level("unknown"));
    }
}
