//! JSON bodies exchanged with the Messages endpoint.

use crate::message::{Request, Response, Role, StopReason, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct Outgoing<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> Outgoing<'a> {
    pub(crate) fn new(request: &'a Request, default_model: &'a str) -> Self {
        Self {
            model: request.model.as_deref().unwrap_or(default_model),
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: request
                .messages
                .iter()
                .map(|m| Turn {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Incoming {
    id: String,
    model: String,
    content: Vec<Block>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

/// Only text blocks matter here; thinking and tool blocks are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    #[serde(other)]
    Ignored,
}

impl From<Incoming> for Response {
    fn from(incoming: Incoming) -> Self {
        let mut text = String::new();
        for block in incoming.content {
            if let Block::Text { text: part } = block {
                text.push_str(&part);
            }
        }
        Response {
            id: incoming.id,
            model: incoming.model,
            text,
            stop_reason: StopReason::from_api(incoming.stop_reason.as_deref()),
            usage: incoming.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_blocks_are_joined() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "I was "},
                {"type": "text", "text": "asleep."}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        }"#;
        let response: Response = serde_json::from_str::<Incoming>(raw).unwrap().into();
        assert_eq!(response.text, "I was asleep.");
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
        assert_eq!(response.usage.output_tokens, 4);
    }

    #[test]
    fn test_missing_usage_defaults_to_zero() {
        let raw = r#"{"id": "m", "model": "x", "content": [], "stop_reason": null}"#;
        let response: Response = serde_json::from_str::<Incoming>(raw).unwrap().into();
        assert!(response.text.is_empty());
        assert_eq!(response.usage, Usage::default());
    }
}
