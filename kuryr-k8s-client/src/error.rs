//! Errors raised by [`crate::Client`].

use kuryr_k8s_core::HandlerError;

/// Failure talking to the Kubernetes API server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport itself failed (DNS, TCP connect, TLS handshake).
    #[error("request to {path} failed: {source}")]
    Transport {
        /// The request path this failure occurred on.
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The server returned a non-2xx status outside the ones this client
    /// gives special meaning to (404, 409).
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        /// HTTP method of the failing request.
        method: &'static str,
        /// Request path.
        path: String,
        /// Status code returned.
        status: http::StatusCode,
        /// Response body, truncated to a reasonable length for logging.
        body: String,
    },

    /// The resource does not exist.
    #[error("{path} not found")]
    NotFound {
        /// Request path.
        path: String,
    },

    /// The response body wasn't valid JSON, or didn't match the shape this
    /// client expected.
    #[error("decoding response from {path}: {source}")]
    Decode {
        /// Request path.
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// `annotate` kept losing the optimistic-concurrency race against a
    /// writer applying a genuinely different value, and gave up after
    /// exhausting its iteration budget.
    #[error("annotate on {path} did not converge after {attempts} attempts")]
    AnnotateDidNotConverge {
        /// Request path.
        path: String,
        /// Number of PATCH attempts made.
        attempts: usize,
    },

    /// `annotate` observed that a concurrent writer had already set one of
    /// the target keys to a different value than the caller intended.
    #[error("annotate on {path}: key {key:?} already set to a conflicting value")]
    AnnotateConflict {
        /// Request path.
        path: String,
        /// The annotation key in conflict.
        key: String,
    },

    /// Reading or parsing the token/certificate material used for
    /// authentication failed.
    #[error("loading credentials from {path}: {source}")]
    Credentials {
        /// Path to the credential file.
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl From<ClientError> for HandlerError {
    fn from(err: ClientError) -> Self {
        HandlerError::client(err)
    }
}
