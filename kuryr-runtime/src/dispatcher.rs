//! Resource-event dispatch (C4): routes a raw `{type, object}` watch event
//! to a handler's `on_present`/`on_deleted`, filtering by the object's
//! `kind` and ignoring event types the handler doesn't care about.

use async_trait::async_trait;
use kuryr_k8s_client::{EventType, WatchEvent};
use kuryr_k8s_core::HandlerError;
use tracing::debug;

/// A handler for one Kubernetes object kind (`"Service"`, `"Endpoints"`, …).
///
/// Implementors are invoked by [`dispatch`] once per watch event whose
/// `object.kind` matches [`ResourceHandler::object_kind`]. `on_present`
/// covers both `ADDED` and `MODIFIED`; there is no distinction between a
/// resource being seen for the first time and being updated.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The `kind` this handler watches, e.g. `"Service"`.
    fn object_kind(&self) -> &str;

    /// Called for `ADDED` and `MODIFIED` events.
    async fn on_present(&self, object: &serde_json::Value) -> Result<(), HandlerError>;

    /// Called for `DELETED` events.
    async fn on_deleted(&self, object: &serde_json::Value) -> Result<(), HandlerError>;
}

/// Routes one decoded watch event to `handler`: events whose `object.kind`
/// doesn't match the handler are ignored; `ADDED` and `MODIFIED` go to
/// `on_present`, `DELETED` to `on_deleted`.
pub async fn dispatch(
    handler: &dyn ResourceHandler,
    event: &WatchEvent,
) -> Result<(), HandlerError> {
    let kind = event.object.get("kind").and_then(serde_json::Value::as_str);
    if kind != Some(handler.object_kind()) {
        debug!(?kind, expected = handler.object_kind(), "ignoring event for unrelated kind");
        return Ok(());
    }

    match &event.event_type {
        EventType::Added | EventType::Modified => handler.on_present(&event.object).await,
        EventType::Deleted => handler.on_deleted(&event.object).await,
        EventType::Other(kind) => {
            debug!(kind = %kind, "ignoring event with unrecognized type");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        present: AtomicU32,
        deleted: AtomicU32,
    }

    #[async_trait]
    impl ResourceHandler for CountingHandler {
        fn object_kind(&self) -> &str {
            "Service"
        }

        async fn on_present(&self, _object: &serde_json::Value) -> Result<(), HandlerError> {
            self.present.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_deleted(&self, _object: &serde_json::Value) -> Result<(), HandlerError> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(event_type: EventType, kind: &str) -> WatchEvent {
        WatchEvent {
            event_type,
            object: json!({"kind": kind}),
        }
    }

    #[tokio::test]
    async fn routes_added_and_modified_to_on_present() {
        let handler = CountingHandler {
            present: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        };
        dispatch(&handler, &event(EventType::Added, "Service")).await.unwrap();
        dispatch(&handler, &event(EventType::Modified, "Service")).await.unwrap();
        assert_eq!(handler.present.load(Ordering::SeqCst), 2);
        assert_eq!(handler.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn routes_deleted_to_on_deleted() {
        let handler = CountingHandler {
            present: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        };
        dispatch(&handler, &event(EventType::Deleted, "Service")).await.unwrap();
        assert_eq!(handler.deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignores_events_for_a_different_kind() {
        let handler = CountingHandler {
            present: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        };
        dispatch(&handler, &event(EventType::Added, "Endpoints")).await.unwrap();
        assert_eq!(handler.present.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ignores_unknown_event_types() {
        let handler = CountingHandler {
            present: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
        };
        dispatch(&handler, &event(EventType::Other("BOOKMARK".to_string()), "Service"))
            .await
            .unwrap();
        assert_eq!(handler.present.load(Ordering::SeqCst), 0);
        assert_eq!(handler.deleted.load(Ordering::SeqCst), 0);
    }
}
