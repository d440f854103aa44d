use clap::Parser;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

// CLI argument structure, every flag can also come from the environment / .env
#[derive(Parser, Debug, Clone)]
#[command(name = "mytube-gateway")]
#[command(about = "Quota-aware caching client for the YouTube Data API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "MYTUBE_PORT", default_value_t = 8080)]
    pub port: u16,

    // Ordered api keys (comma-separated)
    // Example: "AIza...one,AIza...two"
    #[arg(short = 'k', long, env = "MYTUBE_API_KEYS", value_delimiter = ',', required = true)]
    pub api_keys: Vec<String>,

    // Upstream api root
    #[arg(short, long, env = "MYTUBE_API_BASE", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    // Upstream request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub request_timeout: u64,

    // Reads served per cache entry before it is refetched
    #[arg(long, default_value_t = 50)]
    pub cache_max_reuse: u32,

    // maxResults sent on list calls
    #[arg(long, default_value_t = 25)]
    pub max_results: u32,

    // Cache TTLs in seconds
    #[arg(long, default_value_t = 1800)]
    pub trending_ttl: u64,

    #[arg(long, default_value_t = 600)]
    pub search_ttl: u64,

    #[arg(long, default_value_t = 1800)]
    pub related_ttl: u64,

    #[arg(long, default_value_t = 3600)]
    pub video_ttl: u64,

    #[arg(long, default_value_t = 900)]
    pub playlist_ttl: u64,

    #[arg(long, default_value_t = 1800)]
    pub channel_ttl: u64,

    // Inbound rate limit max requests per window
    #[arg(long, default_value_t = 120)]
    pub rate_limit: u32,

    // Inbound rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_keys: self.api_keys.clone(),
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
            max_reuse: self.cache_max_reuse,
            max_results: self.max_results,
            ttls: CacheTtls {
                trending: Duration::from_secs(self.trending_ttl),
                search: Duration::from_secs(self.search_ttl),
                related: Duration::from_secs(self.related_ttl),
                video_details: Duration::from_secs(self.video_ttl),
                playlist_items: Duration::from_secs(self.playlist_ttl),
                channel_videos: Duration::from_secs(self.channel_ttl),
            },
        }
    }
}

// How long each kind of result stays cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub trending: Duration,
    pub search: Duration,
    pub related: Duration,
    pub video_details: Duration,
    pub playlist_items: Duration,
    pub channel_videos: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            trending: Duration::from_secs(1800),
            search: Duration::from_secs(600),
            related: Duration::from_secs(1800),
            video_details: Duration::from_secs(3600),
            playlist_items: Duration::from_secs(900),
            channel_videos: Duration::from_secs(1800),
        }
    }
}

/// Everything the core needs, independent of how it was parsed.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_reuse: u32,
    pub max_results: u32,
    pub ttls: CacheTtls,
}

impl ClientConfig {
    pub fn new<I, S>(api_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_keys: api_keys.into_iter().map(Into::into).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_reuse: 50,
            max_results: 25,
            ttls: CacheTtls::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_split_on_commas_in_order() {
        let args = Args::parse_from(["mytube-gateway", "--api-keys", "one,two,three"]);
        assert_eq!(args.api_keys, ["one", "two", "three"]);

        let config = args.client_config();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.ttls, CacheTtls::default());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn per_operation_ttls_are_configurable() {
        let args = Args::parse_from([
            "mytube-gateway",
            "-k",
            "one",
            "--search-ttl",
            "5",
            "--cache-max-reuse",
            "3",
        ]);
        let config = args.client_config();
        assert_eq!(config.ttls.search, Duration::from_secs(5));
        assert_eq!(config.max_reuse, 3);
    }
}
