//! The composed client the UI talks to.
//!
//! Each query type checks the response cache, then joins or starts a
//! deduplicated upstream call, normalizes the payload and caches it.
//! Upstream trouble of any kind comes back as an empty result; only a
//! missing required argument is reported as an error.

use crate::cache::ResponseCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheTtls, ClientConfig};
use crate::dedup::Deduplicator;
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, GatewayError};
use crate::fetcher::ResilientFetcher;
use crate::keys::KeyRegistry;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::models::{KeyStatus, NormalizedVideo, QuotaSnapshot};
use crate::normalize::{SourceKind, normalize_items};
use crate::quota::QuotaTracker;
use crate::signature::{QueryParams, Signature};
use crate::telemetry::{NoopSink, TelemetryEvent, TelemetrySink};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub type VideoList = Arc<Vec<NormalizedVideo>>;

pub struct MyTubeClient {
    registry: Arc<KeyRegistry>,
    quota: Arc<QuotaTracker>,
    fetcher: Arc<ResilientFetcher>,
    cache: Arc<ResponseCache<VideoList>>,
    dedup: Deduplicator<Option<VideoList>>,
    telemetry: Arc<dyn TelemetrySink>,
    ttls: CacheTtls,
    max_results: u32,
}

impl MyTubeClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_hooks(config, Arc::new(SystemClock), Arc::new(NoopSink))
    }

    pub fn with_hooks(
        config: ClientConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(KeyRegistry::new(&config.api_keys)?);
        let quota = Arc::new(QuotaTracker::new());

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let fetcher = Arc::new(ResilientFetcher::new(
            http,
            &config.base_url,
            Arc::clone(&registry),
            Arc::clone(&quota),
            Arc::clone(&telemetry),
        )?);

        Ok(Self {
            registry,
            quota,
            fetcher,
            cache: Arc::new(ResponseCache::with_clock(config.max_reuse, clock)),
            dedup: Deduplicator::new(),
            telemetry,
            ttls: config.ttls,
            max_results: config.max_results,
        })
    }

    pub async fn trending(&self, region: &str) -> Result<Vec<NormalizedVideo>, GatewayError> {
        let region = required("regionCode", region)?.to_uppercase();

        let mut params = self.list_params("snippet,statistics");
        params.insert("chart", "mostPopular".to_string());
        params.insert("regionCode", region);

        Ok(self
            .fetch_videos(Endpoint::Videos, params, SourceKind::Video, self.ttls.trending)
            .await)
    }

    pub async fn search(&self, term: &str) -> Result<Vec<NormalizedVideo>, GatewayError> {
        let term = required("q", term)?;

        let mut params = self.list_params("snippet");
        params.insert("q", term);
        params.insert("type", "video".to_string());

        Ok(self
            .fetch_videos(Endpoint::Search, params, SourceKind::Search, self.ttls.search)
            .await)
    }

    pub async fn related(&self, video_id: &str) -> Result<Vec<NormalizedVideo>, GatewayError> {
        let video_id = required("relatedToVideoId", video_id)?;

        let mut params = self.list_params("snippet");
        params.insert("relatedToVideoId", video_id);
        params.insert("type", "video".to_string());

        Ok(self
            .fetch_videos(Endpoint::Search, params, SourceKind::Search, self.ttls.related)
            .await)
    }

    pub async fn video_details(
        &self,
        video_id: &str,
    ) -> Result<Option<NormalizedVideo>, GatewayError> {
        let video_id = required("id", video_id)?;

        let mut params = QueryParams::new();
        params.insert("part", "snippet,statistics".to_string());
        params.insert("id", video_id);

        let videos = self
            .fetch_videos(
                Endpoint::Videos,
                params,
                SourceKind::Video,
                self.ttls.video_details,
            )
            .await;
        Ok(videos.into_iter().next())
    }

    pub async fn playlist_items(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<NormalizedVideo>, GatewayError> {
        let playlist_id = required("playlistId", playlist_id)?;

        let mut params = self.list_params("snippet,contentDetails");
        params.insert("playlistId", playlist_id);

        Ok(self
            .fetch_videos(
                Endpoint::PlaylistItems,
                params,
                SourceKind::PlaylistItem,
                self.ttls.playlist_items,
            )
            .await)
    }

    /// Latest uploads of a channel, read from its uploads playlist.
    pub async fn channel_videos(
        &self,
        channel_id: &str,
    ) -> Result<Vec<NormalizedVideo>, GatewayError> {
        let channel_id = required("channelId", channel_id)?;

        let mut params = QueryParams::new();
        params.insert("part", "contentDetails".to_string());
        params.insert("id", channel_id);
        let signature = Signature::new(Endpoint::Channels, &params);

        let max_results = self.max_results.to_string();
        Ok(self
            .cached(signature, self.ttls.channel_videos, move |fetcher| async move {
                let channel = fetcher.request(Endpoint::Channels, &params).await?;
                let uploads = channel
                    .pointer("/items/0/contentDetails/relatedPlaylists/uploads")
                    .and_then(Value::as_str)?
                    .to_string();

                let mut items = QueryParams::new();
                items.insert("part", "snippet,contentDetails".to_string());
                items.insert("playlistId", uploads);
                items.insert("maxResults", max_results);

                let payload = fetcher.request(Endpoint::PlaylistItems, &items).await?;
                Some(normalize_items(&payload, SourceKind::PlaylistItem))
            })
            .await)
    }

    pub fn quota_snapshot(&self) -> QuotaSnapshot {
        self.quota.snapshot()
    }

    pub fn key_status(&self) -> Vec<KeyStatus> {
        self.registry.status()
    }

    pub fn reset_exhausted_keys(&self) {
        self.registry.reset_exhausted();
        tracing::info!("Exhausted api keys revived");
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn invalidate(&self, signature: &Signature) {
        self.cache.invalidate(signature.key());
    }

    // Back to a freshly constructed state, for tests and admin use
    pub fn reset(&self) {
        self.cache.clear_all();
        self.quota.reset();
        self.registry.reset();
    }

    fn list_params(&self, part: &str) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("part", part.to_string());
        params.insert("maxResults", self.max_results.to_string());
        params
    }

    async fn fetch_videos(
        &self,
        endpoint: Endpoint,
        params: QueryParams,
        kind: SourceKind,
        ttl: Duration,
    ) -> Vec<NormalizedVideo> {
        let signature = Signature::new(endpoint, &params);
        self.cached(signature, ttl, move |fetcher| async move {
            let payload = fetcher.request(endpoint, &params).await?;
            Some(normalize_items(&payload, kind))
        })
        .await
    }

    // Cache, then a deduplicated `load`; `None` from `load` means upstream failed
    async fn cached<F, Fut>(
        &self,
        signature: Signature,
        ttl: Duration,
        load: F,
    ) -> Vec<NormalizedVideo>
    where
        F: FnOnce(Arc<ResilientFetcher>) -> Fut,
        Fut: Future<Output = Option<Vec<NormalizedVideo>>> + Send + 'static,
    {
        if let Some(cached) = self.cache.get(signature.key()) {
            CACHE_HITS.inc();
            self.telemetry.emit(TelemetryEvent::CacheHit {
                signature: signature.canonical().to_string(),
            });
            return cached.as_ref().clone();
        }
        CACHE_MISSES.inc();
        self.telemetry.emit(TelemetryEvent::CacheMiss {
            signature: signature.canonical().to_string(),
        });

        let work = load(Arc::clone(&self.fetcher));
        let cache = Arc::clone(&self.cache);
        let cache_key = signature.key().to_string();

        // The producer writes the cache itself so the result lands even if
        // every caller has stopped waiting.
        let outcome = self
            .dedup
            .run(signature.key(), move || async move {
                let videos: VideoList = Arc::new(work.await?);
                if !videos.is_empty() {
                    cache.put(&cache_key, Arc::clone(&videos), ttl);
                }
                Some(videos)
            })
            .await;

        match outcome {
            Ok(Some(videos)) => videos.as_ref().clone(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("{}", e);
                Vec::new()
            }
        }
    }
}

fn required(name: &'static str, value: &str) -> Result<String, GatewayError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GatewayError::MissingParameter(name));
    }
    Ok(value.to_string())
}
