//! Quota-aware data layer over the YouTube Data API.
//!
//! [`MyTubeClient`] rotates api keys on failure, deduplicates concurrent
//! identical requests, caches normalized results and accounts for quota.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod endpoint;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod keys;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod quota;
pub mod rate_limit;
pub mod signature;
pub mod state;
pub mod telemetry;

pub use client::MyTubeClient;
pub use config::ClientConfig;
pub use error::{ConfigError, GatewayError};
pub use models::NormalizedVideo;
