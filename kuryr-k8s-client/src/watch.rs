//! Decoding the newline-delimited JSON stream a `?watch=true` GET returns.

use futures::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::error::ClientError;

/// The `type` field of a watch event.
///
/// Kept forgiving of unrecognized values via [`EventType::Other`] (the same
/// treatment as [`kuryr_k8s_core::Protocol`]) since a real API server also
/// sends `BOOKMARK` and `ERROR` watch events; a deserialize failure here
/// would otherwise conflate "server sent a type we don't model yet" with
/// genuinely malformed JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// The object was created, or this is the initial listing sent when the
    /// watch opens.
    Added,
    /// The object was updated.
    Modified,
    /// The object was deleted.
    Deleted,
    /// Anything else (`BOOKMARK`, `ERROR`, or a future type), preserved
    /// verbatim so the caller can log it without losing information.
    Other(String),
}

impl EventType {
    fn as_wire_str(&self) -> &str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Other(s) => s,
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "ADDED" => EventType::Added,
            "MODIFIED" => EventType::Modified,
            "DELETED" => EventType::Deleted,
            _ => EventType::Other(s),
        })
    }
}

/// One line of a watch stream: `{"type": ..., "object": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEvent {
    /// What happened to `object`.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// The resource, as raw JSON so callers can deserialize into whatever
    /// type they expect (Service, Endpoints, ...).
    pub object: serde_json::Value,
}

/// Adapts a byte stream (the response body) into a stream of decoded watch
/// events, splitting on newlines and skipping blank lines the same way the
/// original client's `iter_lines` does.
pub fn decode_watch_stream<S, E>(
    path: String,
    body: S,
) -> impl Stream<Item = Result<WatchEvent, ClientError>>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let io_stream = body.map(|chunk| {
        chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    });
    let reader = StreamReader::new(io_stream);
    let lines = FramedRead::new(reader, LinesCodec::new());

    lines.filter_map(move |line| {
        let path = path.clone();
        async move {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(ClientError::Transport {
                        path,
                        source: Box::new(e),
                    }))
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            match serde_json::from_str::<WatchEvent>(&line) {
                Ok(event) => Some(Ok(event)),
                Err(e) => Some(Err(ClientError::Decode { path, source: e })),
            }
        }
    })
}
