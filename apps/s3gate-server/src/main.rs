//! S3Gate - an S3-compatible SigV4 verifying reverse proxy.
//!
//! Clients sign requests with emulated credentials; the proxy verifies each
//! signature, resolves the matching backend credential pair, re-signs the
//! request, and relays it to the real storage backend.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:8888 BACKEND_ENDPOINT=http://minio:9000 \
//!     BACKEND_ACCESS_KEY=... BACKEND_SECRET_KEY=... s3gate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8888` | Bind address |
//! | `BACKEND_ENDPOINT` | *(required)* | Storage backend base URI |
//! | `BACKEND_ACCESS_KEY` | *(required for static)* | Backend access key |
//! | `BACKEND_SECRET_KEY` | *(required for static)* | Backend secret key |
//! | `EMULATED_ACCESS_KEY` | backend pair | Client-facing access key |
//! | `EMULATED_SECRET_KEY` | backend pair | Client-facing secret key |
//! | `CREDENTIALS_PROVIDER` | `static` | `static` or `http` |
//! | `CREDENTIALS_HTTP_ENDPOINT` | *(required for http)* | Mapping service URI |
//! | `CREDENTIALS_HTTP_HEADERS` | *(unset)* | Extra `name: value` headers, comma-separated |
//! | `S3_DOMAIN` | *(unset)* | Virtual hosting base domain |
//! | `S3_VIRTUAL_HOSTING` | `false` | Honor virtual-hosted-style addressing |
//! | `AUTH_MAX_SKEW_SECS` | `900` | Allowed clock skew for signed requests |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s3gate_core::{CredentialsBackend, ProxyConfig};
use s3gate_credentials::{CredentialsProvider, HttpCredentialsProvider, StaticCredentialsProvider};
use s3gate_http::ProxyService;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config
/// value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the configured credentials provider.
fn build_provider(config: &ProxyConfig) -> Result<Arc<dyn CredentialsProvider>> {
    match &config.credentials {
        CredentialsBackend::Static(mapping) => {
            info!(
                access_key = %mapping.emulated.access_key,
                "using static credential mapping"
            );
            Ok(Arc::new(StaticCredentialsProvider::new(vec![
                mapping.clone(),
            ])))
        }
        CredentialsBackend::Http(http_config) => {
            info!(endpoint = %http_config.endpoint, "using HTTP credential mapping service");
            let provider = HttpCredentialsProvider::new(http_config)
                .context("failed to build HTTP credentials provider")?;
            Ok(Arc::new(provider))
        }
    }
}

/// Run the accept loop, serving connections until a shutdown signal is
/// received.
async fn serve(listener: TcpListener, service: ProxyService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete, then drop any multipart
    // sessions that never finished.
    graceful.shutdown().await;
    let abandoned = service.tracker().len();
    if abandoned > 0 {
        warn!(abandoned, "dropping unfinished multipart sessions");
        service.tracker().drain();
    }
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by connecting to the gateway and requesting the
/// health endpoint.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /_health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = ProxyConfig::from_env().context("invalid configuration")?;
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = ProxyConfig::from_env().context("invalid configuration")?;

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        backend_endpoint = %config.backend_endpoint,
        virtual_hosting = config.virtual_hosting,
        version = VERSION,
        "starting S3Gate",
    );

    let provider = build_provider(&config)?;
    let service =
        ProxyService::new(&config, provider).context("failed to build proxy service")?;

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_config() -> ProxyConfig {
        ProxyConfig::from_lookup(|var| {
            match var {
                "BACKEND_ENDPOINT" => Some("http://minio:9000"),
                "BACKEND_ACCESS_KEY" => Some("real-ak"),
                "BACKEND_SECRET_KEY" => Some("real-sk"),
                "EMULATED_ACCESS_KEY" => Some("emu-ak"),
                "EMULATED_SECRET_KEY" => Some("emu-sk"),
                _ => None,
            }
            .map(ToOwned::to_owned)
        })
        .expect("valid config")
    }

    #[tokio::test]
    async fn test_should_build_static_provider_from_config() {
        let config = static_config();
        let provider = build_provider(&config).expect("buildable provider");
        let mapping = provider.resolve("emu-ak").await.expect("known key");
        assert_eq!(mapping.backend.access_key, "real-ak");
    }

    #[tokio::test]
    async fn test_should_build_proxy_service_from_config() {
        let config = static_config();
        let provider = build_provider(&config).expect("buildable provider");
        let service = ProxyService::new(&config, provider).expect("buildable service");
        assert!(service.tracker().is_empty());
    }
}
