//! Producer side of the generation pipeline.
//!
//! [`ChatStreamService::spawn_stream`] runs the streaming chat request on
//! a background task and pushes `(StreamMessage, stream_id)` pairs into a
//! bounded channel. The channel is the only seam between the task and the
//! session's single-threaded event loop: the producer awaits `send` (so a
//! full queue applies backpressure rather than reordering or dropping),
//! and the consumer drains with `try_recv` only. Cancellation is
//! cooperative via a [`CancellationToken`]; a token that was already in
//! flight when cancellation fired may still be delivered and is filtered
//! by the consumer's stream-ID and terminal-status checks.

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatChunk, ChatMessage, ChatRequest};

/// Capacity of the generation event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    /// Incremental assistant text.
    Token(String),
    /// Progress note from an image job; never touches turn content.
    Progress(String),
    /// Stream failed; the payload is the rendered error annotation.
    Error(String),
    /// Terminal marker: the producer is finished with this stream ID.
    End,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Spawns streaming tasks and hands them the shared event sender.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::Sender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::Receiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn sender(&self) -> mpsc::Sender<(StreamMessage, u64)> {
        self.tx.clone()
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            let stream_id = params.stream_id;
            tokio::select! {
                _ = run_stream(&tx, params) => {}
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "chat stream cancelled");
                }
            }
        });
    }

    #[cfg(test)]
    pub async fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id)).await;
    }
}

async fn run_stream(tx: &mpsc::Sender<(StreamMessage, u64)>, params: StreamParams) {
    let StreamParams {
        client,
        base_url,
        model,
        api_messages,
        cancel_token,
        stream_id,
    } = params;

    let request = ChatRequest {
        model,
        messages: api_messages,
        stream: true,
    };

    let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
    debug!(stream_id, %url, "starting chat stream");

    let response = match client.post(url).json(&request).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx
                .send((StreamMessage::Error(format_stream_error(&e.to_string())), stream_id))
                .await;
            let _ = tx.send((StreamMessage::End, stream_id)).await;
            return;
        }
    };

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx
            .send((StreamMessage::Error(format_stream_error(&body)), stream_id))
            .await;
        let _ = tx.send((StreamMessage::End, stream_id)).await;
        return;
    }

    let mut body_stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body_stream.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let Ok(bytes) = chunk else {
            let _ = tx
                .send((
                    StreamMessage::Error(format_stream_error("connection lost mid-stream")),
                    stream_id,
                ))
                .await;
            let _ = tx.send((StreamMessage::End, stream_id)).await;
            return;
        };
        buffer.extend_from_slice(&bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(e) => {
                    debug!(stream_id, "invalid UTF-8 in stream: {e}");
                    buffer.drain(..=newline_pos);
                    continue;
                }
            };
            buffer.drain(..=newline_pos);

            match parse_chat_line(&line) {
                None => {}
                Some(LineOutcome::Payload { token, done }) => {
                    if let Some(token) = token {
                        if tx.send((StreamMessage::Token(token), stream_id)).await.is_err() {
                            return;
                        }
                    }
                    if done {
                        let _ = tx.send((StreamMessage::End, stream_id)).await;
                        return;
                    }
                }
                Some(LineOutcome::Error(message)) => {
                    let _ = tx.send((StreamMessage::Error(message), stream_id)).await;
                    let _ = tx.send((StreamMessage::End, stream_id)).await;
                    return;
                }
            }
        }
    }

    // Connection closed without a done marker.
    let _ = tx.send((StreamMessage::End, stream_id)).await;
}

#[derive(Debug, PartialEq)]
enum LineOutcome {
    Payload { token: Option<String>, done: bool },
    Error(String),
}

fn parse_chat_line(line: &str) -> Option<LineOutcome> {
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatChunk>(line) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return Some(LineOutcome::Error(format_stream_error(&error)));
            }
            let token = chunk
                .message
                .map(|m| m.content)
                .filter(|content| !content.is_empty());
            Some(LineOutcome::Payload {
                token,
                done: chunk.done,
            })
        }
        Err(_) => Some(LineOutcome::Error(format_stream_error(line))),
    }
}

/// Renders a service failure as a fenced annotation suitable for turn
/// content. JSON payloads get a one-line summary pulled out when present.
pub fn format_stream_error(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "Error: generation service failure\n```\n<empty>\n```".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .get("error")
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|m| m.as_str().map(str::to_owned)),
                _ => None,
            })
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "));

        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return match summary {
                Some(summary) if !summary.is_empty() => {
                    format!("Error: {summary}\n```json\n{pretty}\n```")
                }
                _ => format!("Error: generation service failure\n```json\n{pretty}\n```"),
            };
        }
    }

    format!("Error: {trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_line_extracts_tokens() {
        let line = r#"{"message":{"role":"assistant","content":"Hello"},"done":false}"#;
        assert_eq!(
            parse_chat_line(line),
            Some(LineOutcome::Payload {
                token: Some("Hello".to_string()),
                done: false,
            })
        );
    }

    #[test]
    fn parse_chat_line_flags_done_and_skips_empty_content() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(
            parse_chat_line(line),
            Some(LineOutcome::Payload {
                token: None,
                done: true,
            })
        );
    }

    #[test]
    fn parse_chat_line_routes_inband_errors() {
        let outcome = parse_chat_line(r#"{"error":"model not found"}"#).unwrap();
        match outcome {
            LineOutcome::Error(message) => assert!(message.contains("model not found")),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_line_treats_garbage_as_error() {
        assert!(matches!(
            parse_chat_line("not json at all"),
            Some(LineOutcome::Error(_))
        ));
        assert_eq!(parse_chat_line(""), None);
    }

    #[test]
    fn format_stream_error_summarizes_json() {
        let formatted = format_stream_error(r#"{"error":"model  overloaded"}"#);
        assert!(formatted.starts_with("Error: model overloaded"));
        assert!(formatted.contains("```json"));
    }

    #[test]
    fn format_stream_error_keeps_plain_text() {
        assert_eq!(
            format_stream_error("  connection refused  "),
            "Error: connection refused"
        );
    }

    #[tokio::test]
    async fn queue_preserves_producer_order() {
        let (service, mut rx) = ChatStreamService::new();
        service
            .send_for_test(StreamMessage::Token("a".into()), 7)
            .await;
        service
            .send_for_test(StreamMessage::Token("b".into()), 7)
            .await;
        service.send_for_test(StreamMessage::End, 7).await;

        let mut seen = Vec::new();
        while let Ok((message, stream_id)) = rx.try_recv() {
            assert_eq!(stream_id, 7);
            seen.push(message);
        }
        assert!(matches!(seen[0], StreamMessage::Token(ref t) if t == "a"));
        assert!(matches!(seen[1], StreamMessage::Token(ref t) if t == "b"));
        assert!(matches!(seen[2], StreamMessage::End));
        assert_eq!(seen.len(), 3);
    }
}
