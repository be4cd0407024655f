//! Anthropic Messages protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProviderKind, unparsable};
use crate::config::ProviderOptions;
use crate::types::{ErrorCategory, LlmError};

pub(super) const DEFAULT_API_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

pub(super) fn request_body(model: &str, prompt: &str, options: &ProviderOptions) -> Value {
    let request = MessagesRequest {
        model,
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: vec![Message {
            role: "user",
            content: prompt,
        }],
        temperature: options.temperature,
    };

    serde_json::to_value(&request).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesResponse {
    Message {
        #[serde(default)]
        content: Vec<ContentBlock>,
        stop_reason: Option<String>,
    },
    Error {
        error: ApiError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    // thinking, tool_use, ...
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

pub(super) fn parse_body(body: &str) -> Result<String, LlmError> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| unparsable(ProviderKind::Anthropic, e))?;

    match response {
        MessagesResponse::Error { error } => Err(LlmError::new(
            ErrorCategory::Provider,
            format!("Anthropic API error ({}): {}", error.error_type, error.message),
        )),
        MessagesResponse::Message {
            content,
            stop_reason,
        } => {
            let texts: Vec<String> = content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    ContentBlock::Other => None,
                })
                .collect();
            let text = texts.concat();

            if !text.is_empty() {
                return Ok(text);
            }
            if stop_reason.as_deref() == Some("refusal") {
                return Err(LlmError::new(
                    ErrorCategory::Blocked,
                    "Anthropic refused the prompt",
                ));
            }
            if texts.is_empty() {
                return Err(LlmError::new(
                    ErrorCategory::ParseError,
                    "No text content in Anthropic response",
                ));
            }
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = request_body("claude-3-7-sonnet-20250219", "hi", &ProviderOptions::default());
        assert_eq!(body["model"], "claude-3-7-sonnet-20250219");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_text_blocks_concatenated_skipping_thinking() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "abc"},
                {"type": "text", "text": "Part one. "},
                {"type": "text", "text": "Part two."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        assert_eq!(parse_body(body).unwrap(), "Part one. Part two.");
    }

    #[test]
    fn test_error_shaped_body() {
        let body = r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        let err = parse_body(body).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Provider);
        assert_eq!(err.message, "Anthropic API error (overloaded_error): Overloaded");
    }

    #[test]
    fn test_refusal() {
        let body = r#"{"type": "message", "content": [], "stop_reason": "refusal"}"#;
        assert_eq!(parse_body(body).unwrap_err().category, ErrorCategory::Blocked);
    }

    #[test]
    fn test_empty_text_block_is_a_completion() {
        let body = r#"{"type": "message", "content": [{"type": "text", "text": ""}], "stop_reason": "end_turn"}"#;
        assert_eq!(parse_body(body).unwrap(), "");

        let body = r#"{"type": "message", "content": [], "stop_reason": "end_turn"}"#;
        assert_eq!(parse_body(body).unwrap_err().category, ErrorCategory::ParseError);
    }
}
