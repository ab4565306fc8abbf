//! SSE (Server-Sent Events) streaming for chat turns.
//!
//! Converts the per-turn event channel into the SSE body the chat page
//! consumes: one JSON chunk per event, then a `[DONE]` sentinel.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// One event of a running chat turn, as seen by the HTTP layer.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A fragment of the assistant reply.
    Delta(String),

    /// The turn finished; carries the full reply.
    Done {
        content: String,
        fragments: usize,
        finish_reason: String,
    },

    /// The turn failed before it could finish.
    Error(String),
}

/// Streaming chunk sent to the page.
#[derive(Debug, Serialize)]
pub struct ChatChunk {
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ChatChunk {
    fn empty(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            delta: None,
            content: None,
            error: None,
            finish_reason: None,
        }
    }
}

/// Convert a chat event receiver into an SSE stream.
pub fn chat_to_sse_stream(
    rx: mpsc::UnboundedReceiver<ChatEvent>,
    request_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    UnboundedReceiverStream::new(rx)
        .map(move |event| {
            let chunk = match event {
                ChatEvent::Delta(text) => ChatChunk {
                    delta: Some(text),
                    ..ChatChunk::empty(&request_id)
                },
                ChatEvent::Done {
                    content,
                    fragments: _,
                    finish_reason,
                } => ChatChunk {
                    content: Some(content),
                    finish_reason: Some(finish_reason),
                    ..ChatChunk::empty(&request_id)
                },
                ChatEvent::Error(e) => ChatChunk {
                    error: Some(e),
                    finish_reason: Some("error".to_string()),
                    ..ChatChunk::empty(&request_id)
                },
            };

            let data = serde_json::to_string(&chunk).unwrap_or_default();
            Ok(Event::default().data(data))
        })
        // Append the [DONE] sentinel after all events.
        .chain(tokio_stream::once(Ok(Event::default().data("[DONE]"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_events(rx: mpsc::UnboundedReceiver<ChatEvent>) -> usize {
        let stream = chat_to_sse_stream(rx, "req-1".to_string());
        tokio::pin!(stream);

        let mut n = 0;
        while let Some(Ok(_event)) = stream.next().await {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn test_stream_ends_with_done_sentinel() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChatEvent::Delta("a".to_string())).unwrap();
        tx.send(ChatEvent::Done {
            content: "a".to_string(),
            fragments: 1,
            finish_reason: "stop".to_string(),
        })
        .unwrap();
        drop(tx);

        // delta + done + sentinel
        assert_eq!(count_events(rx).await, 3);
    }

    #[test]
    fn test_chunk_serialization_skips_empty_fields() {
        let chunk = ChatChunk {
            delta: Some("hi".to_string()),
            ..ChatChunk::empty("req-9")
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json, r#"{"request_id":"req-9","delta":"hi"}"#);
    }

    #[test]
    fn test_error_chunk_carries_reason() {
        let chunk = ChatChunk {
            error: Some("engine died".to_string()),
            finish_reason: Some("error".to_string()),
            ..ChatChunk::empty("req-9")
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("engine died"));
        assert!(json.contains(r#""finish_reason":"error""#));
    }
}
