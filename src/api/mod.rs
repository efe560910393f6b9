//! Wire payloads for the local generation services.
//!
//! The chat service speaks the Ollama API: `POST /api/chat` with a
//! newline-delimited JSON stream of [`ChatChunk`]s, and `GET /api/tags`
//! for the installed model list.

pub mod models;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// One NDJSON line of a streaming chat response.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    /// Some failures arrive in-band as `{"error": "..."}`.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_chunk_parses_streaming_line() {
        let line = r#"{"model":"mistral","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        let chunk: ChatChunk = serde_json::from_str(line).unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hi");
        assert!(!chunk.done);
        assert!(chunk.error.is_none());
    }

    #[test]
    fn chat_chunk_parses_final_line_without_message() {
        let line = r#"{"model":"mistral","done":true,"total_duration":12345}"#;
        let chunk: ChatChunk = serde_json::from_str(line).unwrap();
        assert!(chunk.done);
        assert!(chunk.message.is_none());
    }

    #[test]
    fn chat_chunk_parses_inband_error() {
        let chunk: ChatChunk = serde_json::from_str(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model not found"));
    }

    #[test]
    fn models_response_collects_names() {
        let body = r#"{"models":[{"name":"mistral","size":1},{"name":"gemma3"}]}"#;
        let parsed: ModelsResponse = serde_json::from_str(body).unwrap();
        let names: Vec<&str> = parsed.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["mistral", "gemma3"]);
    }
}
