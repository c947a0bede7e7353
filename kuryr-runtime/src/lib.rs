//! Scheduling, retry, and dispatch machinery shared by the controller's
//! handlers: the per-path [`watcher::Watcher`] (C2), the full-jitter
//! [`retry::with_retry`] wrapper (C3), and the [`dispatcher::dispatch`]
//! routing function (C4).

mod dispatcher;
mod retry;
mod watcher;

pub use dispatcher::{dispatch, ResourceHandler};
pub use retry::{with_retry, RetryPolicy};
pub use watcher::Watcher;
