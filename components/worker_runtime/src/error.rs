//! Error types for worker loading, dispatch, caching and fetching

use thiserror::Error;

/// Errors raised while turning worker source text into a worker instance.
///
/// A load error aborts the reload that produced it; the worker that is
/// currently serving requests is never touched.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Source text is not a well-formed worker definition
    #[error("malformed worker source: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The declared version is empty
    #[error("worker source does not declare a version")]
    MissingVersion,

    /// A route pattern failed to compile
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// A route is missing a field its strategy needs
    #[error("route '{pattern}' with strategy '{strategy}' requires '{field}'")]
    MissingField {
        /// Route pattern
        pattern: String,
        /// Strategy name
        strategy: &'static str,
        /// Name of the missing field
        field: &'static str,
    },

    /// A static response declares a status outside 100..=599
    #[error("route '{pattern}' declares invalid status {status}")]
    InvalidStatus {
        /// Route pattern
        pattern: String,
        /// The declared status
        status: u16,
    },

    /// A declared header name or value is not valid HTTP
    #[error("route '{pattern}' declares invalid header '{name}'")]
    InvalidHeader {
        /// Route pattern
        pattern: String,
        /// Header name
        name: String,
    },
}

/// Result of building a worker from source
pub type WorkerResult<T> = Result<T, LoadError>;

/// A worker failed while handling a dispatched event.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The worker's handler raised an error
    #[error("worker threw while handling {event}: {reason}")]
    Threw {
        /// Event type name
        event: &'static str,
        /// Error description
        reason: String,
    },

    /// The handler needed to schedule async work but no runtime was available
    #[error("no async runtime available for the {0} handler")]
    NoRuntime(&'static str),
}

/// Errors from the Cache API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Partial content cannot be stored
    #[error("cannot cache partial responses (206) for {0}")]
    PartialResponse(String),
}

/// Errors from the fetch capability.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The target URL could not be formed
    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    /// The upstream connection or exchange failed
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The upstream body could not be read
    #[error("failed to read upstream body: {0}")]
    Body(String),
}
