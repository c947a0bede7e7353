//! Error taxonomy shared by the watcher, the handlers, and the drivers.
//!
//! [`HandlerError::ResourceNotReady`] is the only kind the retry wrapper
//! acts on; [`HandlerError::Integrity`] covers bad input and is never
//! retried; the two boxed variants wrap failures that originate below the
//! core (the Kubernetes client, and pluggable drivers) and are opaque to
//! it.

use std::fmt;

/// Errors that can flow out of a [`ResourceHandler`](crate) invocation.
///
/// `kuryr-k8s-client` and `kuryr-drivers` each convert their own error types
/// into this one at the point they hand control back to a handler, rather
/// than this crate depending on either of them.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The resource this handler depends on is not in a consistent state
    /// yet; re-invoke the handler later with the same event.
    #[error("resource not ready: {0}")]
    ResourceNotReady(String),

    /// An invariant was violated by the observed Kubernetes or driver data
    /// (e.g. a Service IP that maps to zero or more than one subnet, or an
    /// unparseable `selfLink`). Logged and surfaced; never retried.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A Kubernetes API client call failed for a reason other than the
    /// well-known "not ready yet" cases.
    #[error("kubernetes client error: {0}")]
    Client(#[source] BoxError),

    /// A driver (project/subnet/security-group/LBaaS) call failed. The
    /// underlying error type is opaque to the core.
    #[error("driver error: {0}")]
    Driver(#[source] BoxError),
}

/// Type-erased `Send + Sync` error, used at crate boundaries where the
/// concrete error type belongs to a crate the core must not depend on.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl HandlerError {
    /// Builds a [`HandlerError::ResourceNotReady`] naming the resource that
    /// was not ready.
    pub fn resource_not_ready(resource: impl fmt::Display) -> Self {
        Self::ResourceNotReady(resource.to_string())
    }

    /// Builds a [`HandlerError::Integrity`] with a formatted message.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Builds a [`HandlerError::Driver`] from any boxable error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }

    /// Builds a [`HandlerError::Client`] from any boxable error.
    pub fn client(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Client(Box::new(err))
    }

    /// `true` for the one error kind the retry wrapper treats as
    /// retryable: [`HandlerError::ResourceNotReady`].
    pub fn is_resource_not_ready(&self) -> bool {
        matches!(self, Self::ResourceNotReady(_))
    }
}

/// Rejected because the annotation's `schema_version` field doesn't match
/// what this build understands.
#[derive(Debug, thiserror::Error)]
#[error("unsupported schema_version {found}, expected {expected}")]
pub struct UnsupportedSchemaVersion {
    /// The version found in the serialized payload.
    pub found: u32,
    /// The version this build expects.
    pub expected: u32,
}
