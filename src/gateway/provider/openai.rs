//! Chat-completions protocol (OpenAI and OpenRouter)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProviderKind, unparsable};
use crate::config::ProviderOptions;
use crate::types::{ErrorCategory, LlmError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

pub(super) fn request_body(
    kind: ProviderKind,
    model: &str,
    prompt: &str,
    options: &ProviderOptions,
) -> Value {
    // OpenAI reasoning models only accept max_completion_tokens
    let (max_completion_tokens, max_tokens) = match kind {
        ProviderKind::OpenAi => (options.max_tokens, None),
        _ => (None, options.max_tokens),
    };

    let request = ChatRequest {
        model,
        messages: vec![Message {
            role: "user",
            content: prompt,
        }],
        max_completion_tokens,
        max_tokens,
        temperature: options.temperature,
        reasoning_effort: options.reasoning_effort.as_deref(),
    };

    serde_json::to_value(&request).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<Value>,
}

pub(super) fn parse_body(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| unparsable(ProviderKind::OpenAi, e))?;

    // OpenRouter reports upstream failures inside a 200 body
    if let Some(error) = response.error {
        let message = match error.code {
            Some(code) => format!("Provider error ({}): {}", code, error.message),
            None => format!("Provider error: {}", error.message),
        };
        return Err(LlmError::new(ErrorCategory::Provider, message));
    }

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        LlmError::new(ErrorCategory::ParseError, "No choices in chat completion response")
    })?;

    let (content, refusal) = match choice.message {
        Some(message) => (message.content, message.refusal),
        None => (None, None),
    };

    if let Some(refusal) = refusal.filter(|r| !r.is_empty()) {
        return Err(LlmError::new(
            ErrorCategory::Blocked,
            format!("Model refused the prompt: {}", refusal),
        ));
    }

    let filtered = choice.finish_reason.as_deref() == Some("content_filter");
    match content {
        Some(content) if !(filtered && content.is_empty()) => Ok(content),
        _ if filtered => Err(LlmError::new(
            ErrorCategory::Blocked,
            "Response withheld by content filter",
        )),
        _ => Err(LlmError::new(
            ErrorCategory::ParseError,
            "No content in chat completion response",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_request_uses_completion_tokens() {
        let options = ProviderOptions {
            max_tokens: Some(4000),
            reasoning_effort: Some("medium".to_string()),
            ..Default::default()
        };
        let body = request_body(ProviderKind::OpenAi, "o4-mini", "hello", &options);
        assert_eq!(body["model"], "o4-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_completion_tokens"], 4000);
        assert_eq!(body["reasoning_effort"], "medium");
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_openrouter_request_uses_max_tokens() {
        let options = ProviderOptions {
            max_tokens: Some(512),
            ..Default::default()
        };
        let body = request_body(ProviderKind::OpenRouter, "meta/llama", "hello", &options);
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_parse_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Answer"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "Other"}}
            ]
        }"#;
        assert_eq!(parse_body(body).unwrap(), "Answer");
    }

    #[test]
    fn test_error_in_success_body() {
        let body = r#"{"error": {"message": "Upstream overloaded", "code": 502}}"#;
        let err = parse_body(body).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Provider);
        assert!(err.message.contains("Upstream overloaded"));
    }

    #[test]
    fn test_refusal_is_blocked() {
        let body = r#"{"choices": [{"message": {"content": null, "refusal": "I can't help with that."}}]}"#;
        let err = parse_body(body).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Blocked);

        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}"#;
        assert_eq!(parse_body(body).unwrap_err().category, ErrorCategory::Blocked);
    }

    #[test]
    fn test_empty_choices() {
        let err = parse_body(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ParseError);
    }

    #[test]
    fn test_empty_content_is_a_completion() {
        let body = r#"{"choices": [{"message": {"content": ""}, "finish_reason": "stop"}]}"#;
        assert_eq!(parse_body(body).unwrap(), "");

        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "stop"}]}"#;
        assert_eq!(parse_body(body).unwrap_err().category, ErrorCategory::ParseError);
    }
}
