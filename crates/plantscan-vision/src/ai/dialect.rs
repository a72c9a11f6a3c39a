//! Wire dialects: request bodies and completion readers per provider API
//!
//! - `ChatCompletions`: `messages` array, bearer auth
//! - `GenerateContent`: `contents[].parts` with inline image data, `x-goog-api-key` auth

use super::transport::{ContentPart, ModelCallSpec, TransportError, TransportErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    ChatCompletions,
    GenerateContent,
}

impl Dialect {
    /// Pick the dialect from the endpoint URL
    pub fn detect(endpoint: &str) -> Self {
        let endpoint = endpoint.to_ascii_lowercase();
        if endpoint.contains("generativelanguage.googleapis.com")
            || endpoint.contains(":generatecontent")
            || endpoint.contains("/models/gemini")
        {
            Dialect::GenerateContent
        } else {
            Dialect::ChatCompletions
        }
    }

    /// Full request URL for `spec`
    pub fn url(&self, spec: &ModelCallSpec) -> String {
        let endpoint = spec.endpoint.trim_end_matches('/');
        match self {
            Dialect::GenerateContent => {
                let lower = endpoint.to_ascii_lowercase();
                if lower.contains(":generatecontent") {
                    endpoint.to_string()
                } else if lower.contains("/models/") {
                    // Endpoint already names the model
                    format!("{}:generateContent", endpoint)
                } else {
                    format!("{}/models/{}:generateContent", endpoint, spec.model)
                }
            }
            Dialect::ChatCompletions => {
                if endpoint.ends_with("/chat/completions") {
                    endpoint.to_string()
                } else {
                    format!("{}/chat/completions", endpoint)
                }
            }
        }
    }

    /// Authentication header for `api_key`
    pub fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self {
            Dialect::GenerateContent => ("x-goog-api-key", api_key.to_string()),
            Dialect::ChatCompletions => ("Authorization", format!("Bearer {}", api_key)),
        }
    }

    /// JSON request body for `spec`
    pub fn request_body(&self, spec: &ModelCallSpec) -> serde_json::Value {
        let body = match self {
            Dialect::GenerateContent => serde_json::to_value(generate_content_request(spec)),
            Dialect::ChatCompletions => serde_json::to_value(chat_completion_request(spec)),
        };
        // Plain data structs; serialization cannot fail
        body.unwrap_or(serde_json::Value::Null)
    }

    /// Pull the completion text out of a 2xx response body
    pub fn read_completion(&self, body: &str) -> Result<String, TransportError> {
        match self {
            Dialect::GenerateContent => read_generate_content(body),
            Dialect::ChatCompletions => read_chat_completion(body),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::ChatCompletions => write!(f, "chat-completions"),
            Dialect::GenerateContent => write!(f, "generate-content"),
        }
    }
}

// ============================================================================
// Generate-content dialect
// ============================================================================

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn generate_content_request(spec: &ModelCallSpec) -> GenerateContentRequest {
    let parts = spec
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => WirePart {
                text: Some(text.clone()),
                inline_data: None,
            },
            ContentPart::InlineImage { mime_type, data } => WirePart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
            },
        })
        .collect();

    GenerateContentRequest {
        contents: vec![WireContent {
            role: Some("user"),
            parts,
        }],
        system_instruction: spec.system_prompt.as_ref().map(|s| WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(s.clone()),
                inline_data: None,
            }],
        }),
        generation_config: spec.max_tokens.map(|n| GenerationConfig {
            max_output_tokens: n,
        }),
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn read_generate_content(body: &str) -> Result<String, TransportError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::new(TransportErrorKind::MalformedResponse, e.to_string()))?;

    let candidate = match response.candidates.as_deref().and_then(|c| c.first()) {
        Some(candidate) => candidate,
        None => {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(TransportError::new(
                TransportErrorKind::Blocked,
                format!("Block reason: {}", reason),
            ));
        }
    };

    let finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
    if finish_reason == "MAX_TOKENS" {
        return Err(TransportError::new(TransportErrorKind::Truncated, finish_reason));
    }
    if BLOCKING_FINISH_REASONS.contains(&finish_reason) {
        return Err(TransportError::new(
            TransportErrorKind::Blocked,
            format!("Finish reason: {}", finish_reason),
        ));
    }

    let text: String = candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.as_ref())
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.thought != Some(true))
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(TransportError::new(
            TransportErrorKind::MissingContent,
            format!("Finish reason: {}", finish_reason),
        ));
    }

    Ok(text)
}

// ============================================================================
// Chat-completions dialect
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: ChatContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

fn chat_completion_request(spec: &ModelCallSpec) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if let Some(system) = &spec.system_prompt {
        messages.push(ChatMessage {
            role: "system",
            content: ChatContent::Text(system.clone()),
        });
    }

    // Text-only turns stay a plain string; images need the parts form
    let content = if spec.has_image() {
        ChatContent::Parts(
            spec.parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => ChatPart::Text { text: text.clone() },
                    ContentPart::InlineImage { mime_type, data } => ChatPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", mime_type, data),
                        },
                    },
                })
                .collect(),
        )
    } else {
        let text = spec
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        ChatContent::Text(text)
    };

    messages.push(ChatMessage {
        role: "user",
        content,
    });

    ChatCompletionRequest {
        model: spec.model.clone(),
        messages,
        max_tokens: spec.max_tokens,
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn read_chat_completion(body: &str) -> Result<String, TransportError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::new(TransportErrorKind::MalformedResponse, e.to_string()))?;

    let choice = response
        .choices
        .as_deref()
        .and_then(|c| c.first())
        .ok_or_else(|| TransportError::new(TransportErrorKind::MissingContent, "No choices returned"))?;

    let finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown");
    match finish_reason {
        "length" => return Err(TransportError::new(TransportErrorKind::Truncated, finish_reason)),
        "content_filter" => {
            return Err(TransportError::new(
                TransportErrorKind::Blocked,
                format!("Finish reason: {}", finish_reason),
            ))
        }
        _ => {}
    }

    let message = choice.message.as_ref();
    if let Some(refusal) = message.and_then(|m| m.refusal.as_deref()) {
        return Err(TransportError::new(TransportErrorKind::Blocked, refusal));
    }

    match message.and_then(|m| m.content.as_deref()) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(TransportError::new(
            TransportErrorKind::MissingContent,
            format!("Finish reason: {}", finish_reason),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(endpoint: &str) -> ModelCallSpec {
        ModelCallSpec::new(endpoint, "secret", "test-model").with_max_tokens(4000)
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            Dialect::detect("https://generativelanguage.googleapis.com/v1beta"),
            Dialect::GenerateContent
        );
        assert_eq!(
            Dialect::detect("http://localhost:9000/v1beta/models/x:generateContent"),
            Dialect::GenerateContent
        );
        assert_eq!(
            Dialect::detect("https://api.openai.com/v1/chat/completions"),
            Dialect::ChatCompletions
        );
        assert_eq!(Dialect::detect("http://localhost:11434/v1"), Dialect::ChatCompletions);
    }

    #[test]
    fn test_urls() {
        let s = spec("https://generativelanguage.googleapis.com/v1beta/");
        assert_eq!(
            Dialect::GenerateContent.url(&s),
            "https://generativelanguage.googleapis.com/v1beta/models/test-model:generateContent"
        );
        let s = spec("https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash");
        assert_eq!(
            Dialect::GenerateContent.url(&s),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        let s = spec("https://proxy.example.com/v1/models/x:generatecontent");
        assert_eq!(
            Dialect::GenerateContent.url(&s),
            "https://proxy.example.com/v1/models/x:generatecontent"
        );
        let s = spec("https://api.openai.com/v1");
        assert_eq!(Dialect::ChatCompletions.url(&s), "https://api.openai.com/v1/chat/completions");
        let s = spec("https://api.openai.com/v1/chat/completions");
        assert_eq!(Dialect::ChatCompletions.url(&s), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_auth_headers() {
        assert_eq!(
            Dialect::ChatCompletions.auth_header("k"),
            ("Authorization", "Bearer k".to_string())
        );
        assert_eq!(Dialect::GenerateContent.auth_header("k"), ("x-goog-api-key", "k".to_string()));
    }

    #[test]
    fn test_generate_content_body_with_image() {
        let s = spec("https://generativelanguage.googleapis.com/v1beta")
            .with_text("identify")
            .with_image("image/png", "AAAA");
        let body = Dialect::GenerateContent.request_body(&s);

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "identify");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "AAAA");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
        assert!(body.get("systemInstruction").is_none());

        let safety = body["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[test]
    fn test_chat_body_text_only() {
        let s = spec("https://api.openai.com/v1")
            .with_system_prompt("be brief")
            .with_text("what is kudzu?");
        let body = Dialect::ChatCompletions.request_body(&s);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "what is kudzu?"}));
    }

    #[test]
    fn test_chat_body_with_image_uses_parts() {
        let s = spec("https://api.openai.com/v1")
            .with_text("identify")
            .with_image("image/jpeg", "AAAA");
        let body = Dialect::ChatCompletions.request_body(&s);
        let content = &body["messages"][0]["content"];

        assert_eq!(content[0], json!({"type": "text", "text": "identify"}));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_read_generate_content_ok() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "thinking", "thought": true}, {"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        assert_eq!(Dialect::GenerateContent.read_completion(&body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_read_generate_content_failures() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let err = Dialect::GenerateContent.read_completion(&blocked).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Blocked);
        assert!(err.detail.contains("SAFETY"));

        let truncated = json!({"candidates": [{"content": {"parts": [{"text": "{\"a\""}]}, "finishReason": "MAX_TOKENS"}]}).to_string();
        assert!(Dialect::GenerateContent.read_completion(&truncated).unwrap_err().is_truncated());

        let no_parts = json!({"candidates": [{"content": {"role": "model"}, "finishReason": "OTHER"}]}).to_string();
        let err = Dialect::GenerateContent.read_completion(&no_parts).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::MissingContent);
        assert!(err.detail.contains("OTHER"));

        let safety = json!({"candidates": [{"finishReason": "SAFETY"}]}).to_string();
        assert_eq!(
            Dialect::GenerateContent.read_completion(&safety).unwrap_err().kind,
            TransportErrorKind::Blocked
        );

        let garbage = Dialect::GenerateContent.read_completion("<html>").unwrap_err();
        assert_eq!(garbage.kind, TransportErrorKind::MalformedResponse);
    }

    #[test]
    fn test_read_chat_completion() {
        let ok = json!({"choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}]}).to_string();
        assert_eq!(Dialect::ChatCompletions.read_completion(&ok).unwrap(), "Hello!");

        let length = json!({"choices": [{"message": {"content": "Hel"}, "finish_reason": "length"}]}).to_string();
        assert!(Dialect::ChatCompletions.read_completion(&length).unwrap_err().is_truncated());

        let filtered = json!({"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}).to_string();
        assert_eq!(
            Dialect::ChatCompletions.read_completion(&filtered).unwrap_err().kind,
            TransportErrorKind::Blocked
        );

        let empty = json!({"choices": []}).to_string();
        assert_eq!(
            Dialect::ChatCompletions.read_completion(&empty).unwrap_err().kind,
            TransportErrorKind::MissingContent
        );
    }
}
