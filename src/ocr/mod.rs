//! OCR engines and the requests we send them.
//!
//! An [`OcrEngine`] takes a reference to a single document (a URL, or the
//! document itself inlined as a `data:` URL) and returns the document's text
//! as an ordered list of Markdown pages.

use std::{sync::Arc, time::Duration};

use clap::{Args, ValueEnum};

use crate::{
    prelude::*,
    rate_limit::{Pacer, RateLimit},
};

pub mod batch;
pub mod echo;
pub mod mistral;

/// A reference to a document, in the form the OCR service expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentReference {
    /// A PDF, either fetchable or inlined as a `data:` URL.
    DocumentUrl { document_url: String },
    /// An image, either fetchable or inlined as a `data:` URL.
    ImageUrl { image_url: String },
}

impl DocumentReference {
    /// The URL this reference points at.
    pub fn url(&self) -> &str {
        match self {
            DocumentReference::DocumentUrl { document_url } => document_url,
            DocumentReference::ImageUrl { image_url } => image_url,
        }
    }
}

/// A request to OCR a single document.
#[derive(Clone, Debug)]
pub struct OcrRequest {
    /// The document to OCR.
    pub document: DocumentReference,

    /// Should the response embed extracted images as Base64?
    pub include_image_base64: bool,
}

/// A single page of OCR output.
#[derive(Clone, Debug, Deserialize)]
pub struct OcrPage {
    /// The zero-based index of this page within the submitted document.
    #[serde(default)]
    pub index: usize,

    /// The text of this page, as Markdown.
    #[serde(default)]
    pub markdown: String,
}

/// The pages returned by an OCR engine.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OcrResponse {
    /// Pages, in document order. A response without pages has no output.
    #[serde(default)]
    pub pages: Vec<OcrPage>,
}

impl OcrResponse {
    /// Join the pages into a single text, separated by blank lines.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// OCR a single document.
    async fn ocr(&self, request: &OcrRequest) -> Result<OcrResponse>;
}

/// Our different engine types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OcrEngineType {
    /// Mistral's hosted OCR API.
    #[default]
    Mistral,

    /// Offline engine that echoes its input, for testing.
    Echo,
}

/// Options controlling how we talk to the OCR engine.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// The OCR engine to use.
    #[clap(long, value_enum, default_value_t = OcrEngineType::default())]
    pub engine: OcrEngineType,

    /// The OCR model to request.
    #[clap(long, default_value = mistral::DEFAULT_MODEL)]
    pub model: String,

    /// Ask the OCR service to embed extracted images in its response.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub include_image_base64: bool,

    /// Seconds to pause after each OCR call, to stay under the service's
    /// request-rate ceiling.
    #[clap(long, default_value_t = 1.0)]
    pub pause: f64,

    /// An additional rate limit for OCR requests, of the form "10/s" or
    /// "60/m".
    #[clap(long)]
    pub rate_limit: Option<RateLimit>,

    /// A timeout, in seconds, for each OCR request and each source download.
    #[clap(long)]
    pub timeout: Option<u64>,
}

impl OcrOpts {
    /// Instantiate the selected engine.
    pub fn create_engine(&self) -> Result<Arc<dyn OcrEngine>> {
        match self.engine {
            OcrEngineType::Mistral => Ok(Arc::new(mistral::MistralOcrEngine::new(
                self.model.clone(),
                self.request_timeout(),
            )?)),
            OcrEngineType::Echo => Ok(Arc::new(echo::EchoOcrEngine)),
        }
    }

    /// The `--timeout` value, if any. It applies to OCR calls and to
    /// downloading URL sources.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Build the [`Pacer`] for these options.
    pub fn create_pacer(&self) -> Result<Pacer> {
        let pause = Duration::try_from_secs_f64(self.pause)
            .with_context(|| format!("invalid --pause value {}", self.pause))?;
        Ok(Pacer::new(pause, self.rate_limit.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_serialize_as_tagged_objects() {
        let doc = DocumentReference::DocumentUrl {
            document_url: "https://example.com/a.pdf".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({
                "type": "document_url",
                "document_url": "https://example.com/a.pdf",
            })
        );
        let image = DocumentReference::ImageUrl {
            image_url: "data:image/png;base64,AA==".to_owned(),
        };
        assert_eq!(serde_json::to_value(&image).unwrap()["type"], "image_url");
        assert_eq!(image.url(), "data:image/png;base64,AA==");
    }

    #[test]
    fn pages_are_joined_with_blank_lines() {
        let response: OcrResponse = serde_json::from_value(serde_json::json!({
            "pages": [
                { "index": 0, "markdown": "# One" },
                { "index": 1, "markdown": "Two" },
            ],
            "model": "mistral-ocr-latest",
        }))
        .unwrap();
        assert_eq!(response.text(), "# One\n\nTwo");
    }

    #[test]
    fn missing_pages_mean_no_output() {
        let response: OcrResponse = serde_json::from_str("{}").unwrap();
        assert!(response.pages.is_empty());
        assert_eq!(response.text(), "");
    }
}
