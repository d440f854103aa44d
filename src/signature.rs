use crate::endpoint::Endpoint;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// Ordered by name so equal parameter sets always serialize the same way
pub type QueryParams = BTreeMap<&'static str, String>;

/// Stable identity of a logical request: endpoint plus sorted parameters.
/// The API key is never part of it, so rotation does not change the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    canonical: String,
    key: String,
}

impl Signature {
    pub fn new(endpoint: Endpoint, params: &QueryParams) -> Self {
        let query = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        let canonical = format!("{}?{}", endpoint.path(), query);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let key = format!("{:x}", hasher.finalize());

        Self { canonical, key }
    }

    // Hashed form used as the cache / in-flight table key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = QueryParams::new();
        a.insert("q", "cats".to_string());
        a.insert("part", "snippet".to_string());

        let mut b = QueryParams::new();
        b.insert("part", "snippet".to_string());
        b.insert("q", "cats".to_string());

        let sa = Signature::new(Endpoint::Search, &a);
        let sb = Signature::new(Endpoint::Search, &b);
        assert_eq!(sa, sb);
        assert_eq!(sa.canonical(), "search?part=snippet&q=cats");
        assert_eq!(sa.key().len(), 64);
    }

    #[test]
    fn endpoint_is_part_of_identity() {
        let mut params = QueryParams::new();
        params.insert("id", "abc".to_string());

        let videos = Signature::new(Endpoint::Videos, &params);
        let channels = Signature::new(Endpoint::Channels, &params);
        assert_ne!(videos.key(), channels.key());
    }
}
