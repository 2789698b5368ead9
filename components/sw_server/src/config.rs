//! Validated runtime configuration

use http::Uri;
use lifecycle::LifecyclePolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::ConfigError;

/// Server configuration derived from the command line
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port
    pub port: u16,
    /// Origin the worker believes it serves, without a trailing slash
    pub origin: String,
    /// Upstream base (`http://host[:port][/prefix]`), without a trailing slash
    pub upstream_base: String,
    /// Value for the `Host` header of proxied requests
    pub upstream_host: String,
    /// Worker source file
    pub worker_path: PathBuf,
    /// Install and activate limits
    pub lifecycle: LifecyclePolicy,
    /// Limit for a claimed fetch event
    pub respond_timeout: Duration,
    /// Reload the worker when its file changes
    pub watch: bool,
}

impl Config {
    /// Validate command-line arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let upstream: Uri = cli
            .network
            .parse()
            .map_err(|e: http::uri::InvalidUri| ConfigError::InvalidUpstream {
                url: cli.network.clone(),
                reason: e.to_string(),
            })?;
        if upstream.scheme_str() != Some("http") {
            return Err(ConfigError::UnsupportedScheme(cli.network.clone()));
        }
        let upstream_host = match upstream.authority() {
            Some(authority) if !authority.host().is_empty() => authority.as_str().to_string(),
            _ => return Err(ConfigError::MissingHost(cli.network.clone())),
        };
        let upstream_base = format!(
            "http://{}{}",
            upstream_host,
            upstream.path().trim_end_matches('/')
        );

        let origin = match &cli.origin {
            Some(origin) => validate_origin(origin)?,
            None => format!("http://localhost:{}", cli.port),
        };

        Ok(Self {
            port: cli.port,
            origin,
            upstream_base,
            upstream_host,
            worker_path: cli.worker.clone(),
            lifecycle: LifecyclePolicy {
                install_timeout: Duration::from_millis(cli.install_timeout_ms),
                activate_timeout: Duration::from_millis(cli.activate_timeout_ms),
            },
            respond_timeout: Duration::from_millis(cli.respond_timeout_ms),
            watch: !cli.no_watch,
        })
    }

    /// Address the server binds
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn validate_origin(origin: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidOrigin(origin.to_string());
    let uri: Uri = origin.parse().map_err(|_| invalid())?;
    match (uri.scheme_str(), uri.authority()) {
        (Some(scheme), Some(authority)) => Ok(format!("{}://{}", scheme, authority)),
        _ => Err(invalid()),
    }
}
