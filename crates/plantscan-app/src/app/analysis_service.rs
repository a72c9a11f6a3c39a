//! Analysis Service - plant photo assessment and follow-up chat
//!
//! Analysis workflow:
//! 1. Resolve provider credentials (the only failure returned as `Err`)
//! 2. Ask the plant classifier, if attached; non-plants short-circuit
//! 3. Default the region, resolve the MIME type, derive the season
//! 4. Build the prompt and the model call
//! 5. Send, retrying with a larger token budget after truncation
//! 6. Extract the assessment from the reply or the transport failure

use crate::classifier::PlantClassifier;
use crate::config::{Config, ProviderCredentials};
use crate::scanner::resolve_mime_type;
use plantscan_types::{AnalysisRequest, ChatContext, Error, PlantAssessment, Result};
use plantscan_vision::{
    assessment_from_outcome, build_analysis_prompt, build_chat_prompt, HttpTransport,
    ModelCallSpec, ModelTransport, SchemaVariant, TransportResult,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates prompt building, transport and extraction
#[derive(Clone)]
pub struct AnalysisService {
    config: Config,
    transport: Arc<dyn ModelTransport>,
    classifier: Option<Arc<dyn PlantClassifier>>,
}

impl AnalysisService {
    pub fn new(config: Config, transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            config,
            transport,
            classifier: None,
        }
    }

    /// Service backed by the HTTP transport, honoring the configured dialect
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = HttpTransport::new()?.with_dialect(config.dialect);
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn PlantClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn schema_variant(&self) -> SchemaVariant {
        if self.config.include_confidence {
            SchemaVariant::WithConfidence
        } else {
            SchemaVariant::Basic
        }
    }

    fn call_spec(&self, creds: ProviderCredentials) -> ModelCallSpec {
        ModelCallSpec::new(creds.endpoint, creds.api_key, creds.model)
    }

    /// Assess one photograph.
    ///
    /// Provider and parsing failures come back as sentinel records; only
    /// missing configuration or a malformed request is an `Err`.
    pub async fn analyze_image(&self, request: AnalysisRequest) -> Result<PlantAssessment> {
        let creds = self.config.credentials()?;

        if request.image.is_empty() {
            return Err(Error::InvalidCallSpec("image is empty".to_string()));
        }
        let bytes = request
            .image
            .bytes()
            .ok_or_else(|| Error::InvalidCallSpec("image is not valid base64".to_string()))?;

        if let Some(classifier) = &self.classifier {
            if !classifier.is_plant(&bytes) {
                info!("classifier rejected image, skipping model call");
                return Ok(PlantAssessment::not_a_plant());
            }
        }

        let region = self.config.region_or_default(request.region.as_deref());
        let mime_type = resolve_mime_type(request.mime_type.as_deref(), Some(bytes.as_ref()))
            .ok_or_else(|| {
                Error::InvalidCallSpec("could not determine the image MIME type".to_string())
            })?;
        let season = request.effective_season();
        let variant = self.schema_variant();

        debug!(%region, %mime_type, date = ?request.date, ?season, "building analysis call");

        let prompt = build_analysis_prompt(&region, request.date, season, variant);
        let mut spec = self
            .call_spec(creds)
            .with_text(prompt)
            .with_image(mime_type, request.image.to_base64())
            .with_max_tokens(self.config.analysis_max_tokens)
            .with_timeout(self.config.analysis_timeout());
        spec.validate()?;

        let outcome = self.send_with_truncation_retry(&mut spec).await;
        let mut assessment = assessment_from_outcome(&outcome);

        if variant == SchemaVariant::Basic {
            assessment.confidence_score = None;
            assessment.confidence_reasoning = None;
        }
        Ok(assessment)
    }

    async fn send_with_truncation_retry(&self, spec: &mut ModelCallSpec) -> TransportResult {
        let mut retries_left = self.config.truncation_retries;
        loop {
            let outcome = self.transport.send(spec).await;
            match &outcome {
                Err(e) if e.is_truncated() && retries_left > 0 => {
                    retries_left -= 1;
                    let budget = spec
                        .max_tokens
                        .unwrap_or(self.config.analysis_max_tokens)
                        .saturating_mul(2);
                    info!(max_tokens = budget, "response truncated, retrying with a larger budget");
                    spec.max_tokens = Some(budget);
                }
                Err(e) => {
                    warn!(kind = ?e.kind, "analysis call failed");
                    return outcome;
                }
                Ok(_) => return outcome,
            }
        }
    }

    /// Answer a free-text question. The reply is plain text; provider
    /// failures come back as their readable error message.
    pub async fn chat(&self, question: &str, context: Option<&ChatContext>) -> Result<String> {
        let creds = self.config.credentials()?;
        if question.trim().is_empty() {
            return Err(Error::InvalidCallSpec("question is empty".to_string()));
        }

        let spec = self
            .call_spec(creds)
            .with_text(build_chat_prompt(question, context))
            .with_max_tokens(self.config.chat_max_tokens)
            .with_timeout(self.config.chat_timeout());
        spec.validate()?;

        match self.transport.send(&spec).await {
            Ok(text) => Ok(text.trim().to_string()),
            Err(e) => {
                warn!(kind = ?e.kind, "chat call failed");
                Ok(e.to_string())
            }
        }
    }
}
