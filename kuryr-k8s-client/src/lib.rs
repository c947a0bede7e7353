//! A minimal Kubernetes API client: GET, WATCH, and optimistic-concurrency
//! ANNOTATE against raw JSON resources.
//!
//! This is not a general-purpose Kubernetes client. It has exactly the
//! surface the controller core needs: fetch one resource, stream a
//! collection's changes, and apply an annotation patch without clobbering a
//! concurrent writer. Callers work in `serde_json::Value` and their own
//! typed views over it rather than a generated OpenAPI model.

mod auth;
mod body;
mod client;
mod config;
mod error;
mod watch;

pub use client::Client;
pub use config::{AuthConfig, Config};
pub use error::ClientError;
pub use watch::{EventType, WatchEvent};
