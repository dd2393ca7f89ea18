//! HTTP-backed credential provider.
//!
//! Mappings live in an external service; the proxy issues
//! `GET {endpoint}/{access-key}` with the configured extra headers and
//! deserializes the JSON response into a [`CredentialMapping`]. A 404 from
//! the service means the key is unknown; any other failure (transport error,
//! timeout, non-2xx) is a resolution error, kept distinct so a flaky mapping
//! service never looks like a bad credential.
//!
//! Successful lookups are cached with a TTL behind a read-mostly lock: every
//! request reads, only a cache refresh writes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::{ConfigError, ResolveError};
use crate::provider::CredentialsProvider;
use crate::types::CredentialMapping;

use async_trait::async_trait;

/// Configuration for [`HttpCredentialsProvider`].
///
/// `headers` holds specifications of the form `"name: value"`. Each entry is
/// split on the FIRST colon only, so values may themselves contain colons
/// (`"x-api-key: Authorization: xyz123"` yields the value
/// `Authorization: xyz123`). An entry with no colon is rejected when the
/// configuration is loaded, never at request time. When the same name
/// appears twice, the last occurrence wins.
#[derive(Debug, Clone)]
pub struct HttpCredentialsProviderConfig {
    /// Base URI of the mapping service. Required.
    pub endpoint: String,
    /// Ordered extra header specifications, `"name: value"` each.
    pub headers: Vec<String>,
    /// Per-lookup timeout.
    pub timeout: Duration,
    /// How long a resolved mapping may be served from cache.
    pub cache_ttl: Duration,
}

impl HttpCredentialsProviderConfig {
    /// Create a config with default timeout (5s) and cache TTL (60s).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
        }
    }

    /// Replace the header specifications.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    /// Validate the endpoint and parse the header specifications.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unparsable endpoint, a specification
    /// without a colon, or a name/value that is not a legal HTTP header.
    pub fn build_headers(&self) -> Result<HeaderMap, ConfigError> {
        reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {e}", self.endpoint)))?;

        let mut map = HeaderMap::with_capacity(self.headers.len());
        for spec in &self.headers {
            let (name, value) = spec
                .split_once(':')
                .ok_or_else(|| ConfigError::MalformedHeader(spec.clone()))?;
            let name = name.trim();
            let value = value.trim();

            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::InvalidHeader {
                    name: name.to_owned(),
                    reason: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

            // insert (not append): a repeated name keeps its last value.
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// A cached mapping with its insertion time.
struct CacheEntry {
    mapping: CredentialMapping,
    resolved_at: Instant,
}

/// Read-mostly TTL cache for resolved mappings.
struct MappingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MappingCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, access_key: &str, now: Instant) -> Option<CredentialMapping> {
        let entries = self.entries.read();
        entries.get(access_key).and_then(|entry| {
            (now.duration_since(entry.resolved_at) < self.ttl).then(|| entry.mapping.clone())
        })
    }

    fn put(&self, access_key: &str, mapping: CredentialMapping, now: Instant) {
        self.entries.write().insert(
            access_key.to_owned(),
            CacheEntry {
                mapping,
                resolved_at: now,
            },
        );
    }
}

/// Credential provider that queries an external HTTP mapping service.
pub struct HttpCredentialsProvider {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    cache: MappingCache,
}

impl std::fmt::Debug for HttpCredentialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCredentialsProvider")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpCredentialsProvider {
    /// Build a provider from its configuration.
    ///
    /// All validation happens here; a provider that constructs successfully
    /// cannot fail on configuration at request time.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an invalid endpoint or header
    /// specification, or when the HTTP client cannot be constructed.
    pub fn new(config: &HttpCredentialsProviderConfig) -> Result<Self, ConfigError> {
        let headers = config.build_headers()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            headers,
            cache: MappingCache::new(config.cache_ttl),
        })
    }

    async fn fetch(&self, access_key: &str) -> Result<CredentialMapping, ResolveError> {
        let url = format!("{}/{access_key}", self.endpoint);
        debug!(%url, "fetching credential mapping");

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "credential mapping service unreachable");
                ResolveError::Backend(e.to_string())
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ResolveError::NotFound(access_key.to_owned())),
            status if status.is_success() => response
                .json::<CredentialMapping>()
                .await
                .map_err(|e| ResolveError::Backend(format!("invalid mapping response: {e}"))),
            status => Err(ResolveError::Backend(format!(
                "mapping service returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl CredentialsProvider for HttpCredentialsProvider {
    async fn resolve(&self, access_key: &str) -> Result<CredentialMapping, ResolveError> {
        let now = Instant::now();
        if let Some(mapping) = self.cache.get(access_key, now) {
            return Ok(mapping);
        }

        let mapping = self.fetch(access_key).await?;
        self.cache.put(access_key, mapping.clone(), Instant::now());
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CredentialPair;

    fn test_mapping() -> CredentialMapping {
        CredentialMapping {
            emulated: CredentialPair::new("emu-ak", "emu-sk"),
            backend: CredentialPair::new("real-ak", "real-sk"),
        }
    }

    #[test]
    fn test_should_parse_header_specifications() {
        let config = HttpCredentialsProviderConfig::new("http://usersvc:9000/api/v1/users")
            .with_headers(vec![
                "x-api-key: xyz123".to_owned(),
                "Content-Type: application/json".to_owned(),
            ]);
        let headers = config.build_headers().expect("valid config");
        assert_eq!(headers.get("x-api-key").unwrap(), "xyz123");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_should_split_on_first_colon_only() {
        let config = HttpCredentialsProviderConfig::new("http://usersvc:9000/api/v1/users")
            .with_headers(vec!["x-api-key: Authorization: xyz123".to_owned()]);
        let headers = config.build_headers().expect("valid config");
        assert_eq!(headers.get("x-api-key").unwrap(), "Authorization: xyz123");
    }

    #[test]
    fn test_should_reject_header_without_colon_at_load_time() {
        let config = HttpCredentialsProviderConfig::new("http://usersvc:9000/api/v1/users")
            .with_headers(vec!["malformed-header".to_owned()]);
        let result = config.build_headers();
        assert!(matches!(result, Err(ConfigError::MalformedHeader(_))));
    }

    #[test]
    fn test_should_keep_last_value_for_duplicate_header_name() {
        let config = HttpCredentialsProviderConfig::new("http://usersvc:9000")
            .with_headers(vec![
                "x-api-key: first".to_owned(),
                "x-api-key: second".to_owned(),
            ]);
        let headers = config.build_headers().expect("valid config");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-api-key").unwrap(), "second");
    }

    #[test]
    fn test_should_reject_invalid_endpoint() {
        let config = HttpCredentialsProviderConfig::new("not a uri");
        assert!(matches!(
            config.build_headers(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_should_fail_provider_construction_on_malformed_header() {
        let config = HttpCredentialsProviderConfig::new("http://usersvc:9000")
            .with_headers(vec!["no-colon-here".to_owned()]);
        assert!(HttpCredentialsProvider::new(&config).is_err());
    }

    #[test]
    fn test_should_serve_cached_mapping_within_ttl() {
        let cache = MappingCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.put("emu-ak", test_mapping(), t0);

        let hit = cache.get("emu-ak", t0 + Duration::from_secs(30));
        assert_eq!(hit, Some(test_mapping()));
    }

    #[test]
    fn test_should_expire_cached_mapping_after_ttl() {
        let cache = MappingCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.put("emu-ak", test_mapping(), t0);

        let miss = cache.get("emu-ak", t0 + Duration::from_secs(61));
        assert!(miss.is_none());
    }

    #[test]
    fn test_should_miss_cache_for_unknown_key() {
        let cache = MappingCache::new(Duration::from_secs(60));
        assert!(cache.get("unknown", Instant::now()).is_none());
    }
}
