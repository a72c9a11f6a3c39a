//! Transport-neutral model call description and the transport seam
//!
//! A `ModelTransport` performs exactly one round trip. Provider failures are
//! returned as `TransportError` values, never raised; their `Display` form is
//! the sentinel text users see in chat replies.

use async_trait::async_trait;
use plantscan_types::{Error, Result};
use std::time::Duration;

/// One segment of the user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64 image bytes with their MIME type
    InlineImage { mime_type: String, data: String },
}

/// Everything needed for one model invocation
#[derive(Debug, Clone)]
pub struct ModelCallSpec {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub parts: Vec<ContentPart>,
    /// Output token ceiling
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ModelCallSpec {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: None,
            parts: Vec::new(),
            max_tokens: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    pub fn with_image(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.parts.push(ContentPart::InlineImage {
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ContentPart::InlineImage { .. }))
    }

    /// Check the invariants a malformed call would violate.
    ///
    /// At least one non-empty text part; every image part carries an
    /// `image/*` MIME type and data.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidCallSpec("endpoint is empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::InvalidCallSpec("model is empty".to_string()));
        }

        let has_text = self
            .parts
            .iter()
            .any(|p| matches!(p, ContentPart::Text(t) if !t.trim().is_empty()));
        if !has_text {
            return Err(Error::InvalidCallSpec(
                "at least one text part is required".to_string(),
            ));
        }

        for part in &self.parts {
            if let ContentPart::InlineImage { mime_type, data } = part {
                if !mime_type.starts_with("image/") || mime_type.len() <= "image/".len() {
                    return Err(Error::InvalidCallSpec(format!(
                        "inline image has invalid MIME type '{}'",
                        mime_type
                    )));
                }
                if data.is_empty() {
                    return Err(Error::InvalidCallSpec("inline image is empty".to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Category of a failed round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Non-2xx response
    Http { status: u16 },
    /// Connection-level failure
    Network,
    Timeout { seconds: u64 },
    /// Provider withheld the content (safety filter, refusal, empty candidates)
    Blocked,
    /// Output stopped at the token ceiling
    Truncated,
    /// Candidate present but carried no text
    MissingContent,
    /// 2xx body that is not the expected shape
    MalformedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Http { status }, body)
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout {
                seconds: timeout.as_secs().max(1),
            },
            "",
        )
    }

    pub fn is_truncated(&self) -> bool {
        self.kind == TransportErrorKind::Truncated
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Timeout { .. })
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TransportErrorKind::Http { status } => {
                write!(f, "HTTP Error: {}\nResponse Content: {}", status, self.detail)
            }
            TransportErrorKind::Network => write!(f, "Network Error: {}", self.detail),
            TransportErrorKind::Timeout { seconds } => write!(
                f,
                "Request timed out after {} seconds. The model may be busy, please try again.",
                seconds
            ),
            TransportErrorKind::Blocked => write!(
                f,
                "Error: Prompt may have been blocked by safety settings. {}",
                self.detail
            ),
            TransportErrorKind::Truncated => write!(
                f,
                "Response truncated due to token limit. Please increase max_tokens."
            ),
            TransportErrorKind::MissingContent => {
                write!(f, "No content parts in response. {}", self.detail)
            }
            TransportErrorKind::MalformedResponse => {
                write!(f, "Error parsing API response: {}", self.detail)
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Leading text of every rendered `TransportError`
pub const SENTINEL_PREFIXES: &[&str] = &[
    "HTTP Error",
    "Network Error",
    "Request timed out",
    "Error: Prompt may have been blocked",
    "Response truncated due to token limit",
    "No content parts in response",
    "Error parsing API response",
    "An unexpected error occurred",
];

/// Whether `text` is a rendered transport failure rather than a completion
pub fn is_error_sentinel(text: &str) -> bool {
    let text = text.trim_start();
    SENTINEL_PREFIXES.iter().any(|p| text.starts_with(p))
}

pub type TransportResult = std::result::Result<String, TransportError>;

/// One network round trip to a model provider
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn send(&self, spec: &ModelCallSpec) -> TransportResult;
}
