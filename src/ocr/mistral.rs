//! Mistral's hosted OCR API.

use std::{env, time::Duration};

use super::{DocumentReference, OcrEngine, OcrRequest, OcrResponse};
use crate::prelude::*;

/// The model we request by default.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// The default API base URL.
const DEFAULT_API_BASE: &str = "https://api.mistral.ai/v1";

/// Request body for `POST /ocr`.
#[derive(Debug, Serialize)]
struct MistralOcrRequest<'a> {
    model: &'a str,
    document: &'a DocumentReference,
    include_image_base64: bool,
}

/// OCR engine backed by Mistral's `/v1/ocr` endpoint.
pub struct MistralOcrEngine {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl MistralOcrEngine {
    /// Create a new engine, reading credentials from `MISTRAL_API_KEY` and
    /// (optionally) `MISTRAL_API_BASE`.
    pub fn new(model: String, timeout: Option<Duration>) -> Result<Self> {
        let api_key = env::var("MISTRAL_API_KEY")
            .context("MISTRAL_API_KEY must be set to use the Mistral OCR engine")?;
        let api_base =
            env::var("MISTRAL_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());
        Self::with_api_base(api_base, api_key, model, timeout)
    }

    /// Create a new engine talking to a specific server.
    pub fn with_api_base(
        api_base: String,
        api_key: String,
        model: String,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to create HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            api_key,
            model,
        })
    }

    /// The full URL of the OCR endpoint.
    fn endpoint(&self) -> String {
        format!("{}/ocr", self.api_base)
    }
}

#[async_trait]
impl OcrEngine for MistralOcrEngine {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn ocr(&self, request: &OcrRequest) -> Result<OcrResponse> {
        let body = MistralOcrRequest {
            model: &self.model,
            document: &request.document,
            include_image_base64: request.include_image_base64,
        };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to send OCR request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OCR request failed with status {}: {}", status, body));
        }

        let response = response
            .json::<OcrResponse>()
            .await
            .context("failed to parse OCR response")?;
        debug!(pages = response.pages.len(), "received OCR response");
        for page in &response.pages {
            trace!(index = page.index, len = page.markdown.len(), "OCRed page");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_api() {
        let document = DocumentReference::DocumentUrl {
            document_url: "https://example.com/a.pdf".to_owned(),
        };
        let body = MistralOcrRequest {
            model: DEFAULT_MODEL,
            document: &document,
            include_image_base64: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "mistral-ocr-latest",
                "document": {
                    "type": "document_url",
                    "document_url": "https://example.com/a.pdf",
                },
                "include_image_base64": true,
            })
        );
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let engine = MistralOcrEngine::with_api_base(
            "http://localhost:8080/v1/".to_owned(),
            "key".to_owned(),
            DEFAULT_MODEL.to_owned(),
            None,
        )
        .unwrap();
        assert_eq!(engine.endpoint(), "http://localhost:8080/v1/ocr");
    }
}
