//! Environment-driven proxy configuration.
//!
//! Everything is read once at startup and validated eagerly: an unparsable
//! endpoint, a malformed credential-service header, or a bad number fails
//! boot instead of surfacing on the first request.

use std::time::Duration;

use s3gate_credentials::http::HttpCredentialsProviderConfig;
use s3gate_credentials::types::{CredentialMapping, CredentialPair};
use thiserror::Error;

/// Errors raised while loading proxy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A variable is present but unusable.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The offending variable.
        var: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The credentials provider configuration is invalid.
    #[error(transparent)]
    Credentials(#[from] s3gate_credentials::ConfigError),
}

/// Which credential provider backs the proxy.
#[derive(Debug, Clone)]
pub enum CredentialsBackend {
    /// A single fixed mapping, for tests and single-tenant deployments.
    Static(CredentialMapping),
    /// Lookups against an external HTTP mapping service.
    Http(HttpCredentialsProviderConfig),
}

/// Top-level proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bind address for the listener.
    pub gateway_listen: String,
    /// Base domain for virtual-hosted-style bucket extraction.
    pub s3_domain: Option<String>,
    /// Whether virtual-hosted-style addressing is honored.
    pub virtual_hosting: bool,
    /// Region assumed when a request does not pin one.
    pub default_region: String,
    /// Base URI of the storage backend. Required.
    pub backend_endpoint: String,
    /// Maximum tolerated clock skew for signed requests.
    pub max_skew: chrono::Duration,
    /// Log level when `RUST_LOG` is not set.
    pub log_level: String,
    /// Credential provider selection.
    pub credentials: CredentialsBackend,
}

impl ProxyConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; nothing is deferred to request time.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_endpoint = lookup("BACKEND_ENDPOINT")
            .ok_or(ConfigError::MissingVar("BACKEND_ENDPOINT"))?;
        backend_endpoint
            .parse::<http::Uri>()
            .map_err(|e| ConfigError::InvalidValue {
                var: "BACKEND_ENDPOINT",
                reason: e.to_string(),
            })?;

        let max_skew_secs = parse_secs(&lookup, "AUTH_MAX_SKEW_SECS")?.unwrap_or(900);

        let credentials = match lookup("CREDENTIALS_PROVIDER").as_deref() {
            None | Some("static") => static_backend(&lookup)?,
            Some("http") => http_backend(&lookup)?,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "CREDENTIALS_PROVIDER",
                    reason: format!("expected \"static\" or \"http\", got {other:?}"),
                });
            }
        };

        Ok(Self {
            gateway_listen: lookup("GATEWAY_LISTEN").unwrap_or_else(|| "0.0.0.0:8888".to_owned()),
            s3_domain: lookup("S3_DOMAIN"),
            virtual_hosting: lookup("S3_VIRTUAL_HOSTING")
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            default_region: lookup("DEFAULT_REGION").unwrap_or_else(|| "us-east-1".to_owned()),
            backend_endpoint,
            max_skew: chrono::Duration::seconds(max_skew_secs),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            credentials,
        })
    }
}

fn static_backend(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<CredentialsBackend, ConfigError> {
    let backend_access = lookup("BACKEND_ACCESS_KEY")
        .ok_or(ConfigError::MissingVar("BACKEND_ACCESS_KEY"))?;
    let backend_secret = lookup("BACKEND_SECRET_KEY")
        .ok_or(ConfigError::MissingVar("BACKEND_SECRET_KEY"))?;

    // Without an explicit emulated pair the backend pair doubles as the
    // client-facing one.
    let emulated_access = lookup("EMULATED_ACCESS_KEY").unwrap_or_else(|| backend_access.clone());
    let emulated_secret = lookup("EMULATED_SECRET_KEY").unwrap_or_else(|| backend_secret.clone());

    Ok(CredentialsBackend::Static(CredentialMapping {
        emulated: CredentialPair::new(emulated_access, emulated_secret),
        backend: CredentialPair::new(backend_access, backend_secret),
    }))
}

fn http_backend(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<CredentialsBackend, ConfigError> {
    let endpoint = lookup("CREDENTIALS_HTTP_ENDPOINT")
        .ok_or(ConfigError::MissingVar("CREDENTIALS_HTTP_ENDPOINT"))?;

    let headers = lookup("CREDENTIALS_HTTP_HEADERS")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let mut config = HttpCredentialsProviderConfig::new(endpoint).with_headers(headers);
    if let Some(secs) = parse_secs(lookup, "CREDENTIALS_HTTP_TIMEOUT_SECS")? {
        config.timeout = Duration::from_secs(u64::try_from(secs).unwrap_or(0));
    }
    if let Some(secs) = parse_secs(lookup, "CREDENTIALS_CACHE_TTL_SECS")? {
        config.cache_ttl = Duration::from_secs(u64::try_from(secs).unwrap_or(0));
    }

    // Surfaces malformed header specs and a bad endpoint at boot.
    config.build_headers()?;

    Ok(CredentialsBackend::Http(config))
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<i64>, ConfigError> {
    lookup(var)
        .map(|v| {
            v.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_should_load_minimal_static_config_with_defaults() {
        let config = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("BACKEND_ACCESS_KEY", "real-ak"),
            ("BACKEND_SECRET_KEY", "real-sk"),
        ]))
        .expect("valid config");

        assert_eq!(config.gateway_listen, "0.0.0.0:8888");
        assert_eq!(config.default_region, "us-east-1");
        assert_eq!(config.max_skew, chrono::Duration::seconds(900));
        assert!(!config.virtual_hosting);
        let CredentialsBackend::Static(mapping) = config.credentials else {
            panic!("expected static backend");
        };
        assert_eq!(mapping.emulated.access_key, "real-ak");
        assert_eq!(mapping.backend.access_key, "real-ak");
    }

    #[test]
    fn test_should_use_separate_emulated_pair_when_given() {
        let config = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("BACKEND_ACCESS_KEY", "real-ak"),
            ("BACKEND_SECRET_KEY", "real-sk"),
            ("EMULATED_ACCESS_KEY", "emu-ak"),
            ("EMULATED_SECRET_KEY", "emu-sk"),
        ]))
        .expect("valid config");

        let CredentialsBackend::Static(mapping) = config.credentials else {
            panic!("expected static backend");
        };
        assert_eq!(mapping.emulated.access_key, "emu-ak");
        assert_eq!(mapping.backend.access_key, "real-ak");
    }

    #[test]
    fn test_should_require_backend_endpoint() {
        let result = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ACCESS_KEY", "ak"),
            ("BACKEND_SECRET_KEY", "sk"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::MissingVar("BACKEND_ENDPOINT"))
        ));
    }

    #[test]
    fn test_should_build_http_provider_config() {
        let config = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("CREDENTIALS_PROVIDER", "http"),
            ("CREDENTIALS_HTTP_ENDPOINT", "http://usersvc:9000/api/v1/users"),
            (
                "CREDENTIALS_HTTP_HEADERS",
                "x-api-key: xyz123, x-tenant: blue",
            ),
            ("CREDENTIALS_HTTP_TIMEOUT_SECS", "3"),
            ("CREDENTIALS_CACHE_TTL_SECS", "120"),
        ]))
        .expect("valid config");

        let CredentialsBackend::Http(http) = config.credentials else {
            panic!("expected http backend");
        };
        assert_eq!(http.endpoint, "http://usersvc:9000/api/v1/users");
        assert_eq!(http.headers, vec!["x-api-key: xyz123", "x-tenant: blue"]);
        assert_eq!(http.timeout, Duration::from_secs(3));
        assert_eq!(http.cache_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_should_fail_boot_on_malformed_credential_header() {
        let result = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("CREDENTIALS_PROVIDER", "http"),
            ("CREDENTIALS_HTTP_ENDPOINT", "http://usersvc:9000"),
            ("CREDENTIALS_HTTP_HEADERS", "malformed-header"),
        ]));
        assert!(matches!(result, Err(ConfigError::Credentials(_))));
    }

    #[test]
    fn test_should_reject_unknown_provider_kind() {
        let result = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("CREDENTIALS_PROVIDER", "ldap"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                var: "CREDENTIALS_PROVIDER",
                ..
            })
        ));
    }

    #[test]
    fn test_should_reject_unparsable_backend_endpoint() {
        let result = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://exa mple"),
            ("BACKEND_ACCESS_KEY", "ak"),
            ("BACKEND_SECRET_KEY", "sk"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                var: "BACKEND_ENDPOINT",
                ..
            })
        ));
    }

    #[test]
    fn test_should_reject_non_numeric_skew() {
        let result = ProxyConfig::from_lookup(env(&[
            ("BACKEND_ENDPOINT", "http://minio:9000"),
            ("BACKEND_ACCESS_KEY", "ak"),
            ("BACKEND_SECRET_KEY", "sk"),
            ("AUTH_MAX_SKEW_SECS", "soon"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                var: "AUTH_MAX_SKEW_SECS",
                ..
            })
        ));
    }
}
