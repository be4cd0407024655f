//! Gemini `generateContent` protocol

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{ProviderKind, unparsable};
use crate::config::ProviderOptions;
use crate::types::{ErrorCategory, LlmError};

/// Finish reasons that mean the candidate was withheld by policy
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

pub(super) fn request_body(prompt: &str, options: &ProviderOptions) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }]
    });

    let mut generation_config = Map::new();
    if let Some(max_tokens) = options.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if let Some(temperature) = options.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if !generation_config.is_empty() {
        body["generationConfig"] = Value::Object(generation_config);
    }

    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

pub(super) fn parse_body(body: &str) -> Result<String, LlmError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| unparsable(ProviderKind::Gemini, e))?;

    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(LlmError::new(
            ErrorCategory::Blocked,
            format!("Prompt blocked by Gemini: {}", reason),
        ));
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        LlmError::new(ErrorCategory::ParseError, "No candidates in Gemini response")
    })?;

    let texts: Vec<String> = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = texts.concat();

    if text.is_empty() {
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|reason| BLOCKED_FINISH_REASONS.contains(reason))
        {
            return Err(LlmError::new(
                ErrorCategory::Blocked,
                format!("Response blocked by Gemini: {}", reason),
            ));
        }
        // An empty text part is a legitimate (empty) answer
        if texts.is_empty() {
            return Err(LlmError::new(
                ErrorCategory::ParseError,
                "No text content in Gemini response",
            ));
        }
    }

    Ok(text)
}
