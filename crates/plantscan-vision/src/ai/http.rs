//! reqwest-backed `ModelTransport`

use super::dialect::Dialect;
use super::transport::{
    ModelCallSpec, ModelTransport, TransportError, TransportErrorKind, TransportResult,
};
use async_trait::async_trait;
use plantscan_types::{excerpt, Error, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends model calls over HTTP, choosing the wire dialect from the endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    dialect: Option<Dialect>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self {
            client,
            dialect: None,
        })
    }

    /// Force a dialect instead of detecting it from the endpoint
    pub fn with_dialect(mut self, dialect: Option<Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect_for(&self, spec: &ModelCallSpec) -> Dialect {
        self.dialect.unwrap_or_else(|| Dialect::detect(&spec.endpoint))
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(timeout)
    } else {
        TransportError::new(TransportErrorKind::Network, err.to_string())
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn send(&self, spec: &ModelCallSpec) -> TransportResult {
        let dialect = self.dialect_for(spec);
        let url = dialect.url(spec);
        let (header, value) = dialect.auth_header(&spec.api_key);

        debug!(
            %dialect,
            model = %spec.model,
            image = spec.has_image(),
            timeout_secs = spec.timeout.as_secs(),
            "sending model request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(spec.timeout)
            .header(header, value)
            .json(&dialect.request_body(spec))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, spec.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(e, spec.timeout))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "model provider returned an error status");
            return Err(TransportError::http(status.as_u16(), excerpt(&body, 500)));
        }

        let completion = dialect.read_completion(&body);
        match &completion {
            Ok(text) => debug!(chars = text.len(), "model completion received"),
            Err(e) => warn!(kind = ?e.kind, "model response carried no usable completion"),
        }
        completion
    }
}
