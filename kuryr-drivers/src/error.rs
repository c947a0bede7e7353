//! The error type driver implementations raise. Opaque to `kuryr-runtime`
//! and `kuryr-k8s-core`, which only see it boxed inside
//! [`kuryr_k8s_core::HandlerError::Driver`].

/// A failure from a project/subnet/security-group/LBaaS driver call.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The backing OpenStack service rejected or failed the request.
    #[error("{operation} failed: {message}")]
    Backend {
        /// What was being attempted, e.g. `"ensure_loadbalancer"`.
        operation: &'static str,
        /// Human-readable detail from the backend.
        message: String,
    },
    /// The driver was asked to operate on data it can't make sense of (a
    /// malformed object, a reference to an entity that doesn't exist in its
    /// own bookkeeping).
    #[error("invalid input to {operation}: {message}")]
    InvalidInput {
        /// What was being attempted.
        operation: &'static str,
        /// Why the input was rejected.
        message: String,
    },
}
