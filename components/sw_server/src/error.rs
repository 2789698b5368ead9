//! Error types for the server

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid command-line configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The upstream URL does not parse
    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUpstream {
        /// URL as given
        url: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Only plain http upstreams are proxied
    #[error("upstream url '{0}' must use the http scheme")]
    UnsupportedScheme(String),

    /// The upstream URL has no host
    #[error("upstream url '{0}' has no host")]
    MissingHost(String),

    /// The origin is not an absolute URL
    #[error("invalid origin '{0}': expected scheme://host[:port]")]
    InvalidOrigin(String),
}

/// Server startup and runtime errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The upstream client could not be created
    #[error("invalid upstream: {0}")]
    Upstream(#[from] worker_runtime::FetchError),

    /// The listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The worker file could not be read
    #[error("failed to read worker {}: {source}", path.display())]
    ReadWorker {
        /// Worker path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The file watcher could not be started
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        /// Watched path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: notify::Error,
    },

    /// The server loop failed
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
