//! Vision module - prompt building, model transport and response extraction

pub mod ai;
pub mod extract;

// Re-export main types for convenience
pub use ai::dialect::Dialect;
pub use ai::http::HttpTransport;
pub use ai::prompts::{build_agent_prompt, build_analysis_prompt, build_chat_prompt, AgentPersona, SchemaVariant};
pub use ai::transport::{
    is_error_sentinel, ContentPart, ModelCallSpec, ModelTransport, TransportError,
    TransportErrorKind, TransportResult,
};
pub use extract::{
    assessment_from_outcome, extract_assessment, extract_with_log, Extraction, ExtractionAttempt,
    Strategy,
};
