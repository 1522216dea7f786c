//! Running a batch of documents through an OCR engine.
//!
//! Documents are processed one at a time, in submission order. Long PDFs are
//! split into chunks, each chunk is OCRed separately, and the chunk texts are
//! joined back together. A failed call never aborts the batch: its text is
//! replaced by an error message and we move on.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use super::{DocumentReference, OcrEngine, OcrRequest};
use crate::{
    async_utils::spawn_blocking_propagating_panics,
    chunker::{self, Chunk},
    document::{Document, DocumentType, Source},
    normalize::Normalizer,
    prelude::*,
    rate_limit::Pacer,
    results::{DocumentResult, WorkStatus},
    ui::Ui,
};

/// Text used when a single document produced no output.
const NO_RESULT_TEXT: &str = "No result found.";

/// Settings for a [`BatchProcessor`].
pub struct BatchConfig {
    /// Are our sources PDFs or images?
    pub document_type: DocumentType,

    /// The most pages we send in a single OCR request.
    pub pages_per_chunk: NonZeroUsize,

    /// Ask the engine to embed extracted images.
    pub include_image_base64: bool,

    /// Clean up the output, unless `None`.
    pub normalizer: Option<Normalizer>,

    /// A timeout for downloading URL sources.
    pub download_timeout: Option<Duration>,
}

/// Everything we need to submit for one source.
struct Submission {
    page_count: Option<usize>,
    requests: Vec<OcrRequest>,
}

/// OCRs documents one at a time.
pub struct BatchProcessor {
    ui: Ui,
    client: reqwest::Client,
    engine: Arc<dyn OcrEngine>,
    pacer: Pacer,
    config: BatchConfig,
}

impl BatchProcessor {
    /// Create a new processor.
    pub fn new(
        ui: Ui,
        engine: Arc<dyn OcrEngine>,
        pacer: Pacer,
        config: BatchConfig,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.download_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to create HTTP client")?;
        Ok(Self {
            ui,
            client,
            engine,
            pacer,
            config,
        })
    }

    /// OCR a single source. `index` is the zero-based position of `source` in
    /// the batch.
    ///
    /// This never fails. Problems are reported in the returned result.
    #[instrument(level = "debug", skip_all, fields(index = index, source = %source))]
    pub async fn process_source(&self, index: usize, source: &Source) -> DocumentResult {
        let mut result = DocumentResult {
            id: index,
            source: source.to_string(),
            name: source.base_name(index),
            status: WorkStatus::Ok,
            errors: vec![],
            page_count: None,
            chunk_count: 0,
            text: String::new(),
        };

        let submission = match self.prepare(source).await {
            Ok(submission) => submission,
            Err(err) => {
                let msg = format!("{:#}", err);
                error!(%source, "failed to load document: {}", msg);
                result.status = WorkStatus::Failed;
                result.text = format!("Error extracting result: {}", msg);
                result.errors.push(msg);
                return result;
            }
        };
        result.page_count = submission.page_count;
        result.chunk_count = submission.requests.len();

        let text = if let [request] = submission.requests.as_slice() {
            match self.call(request).await {
                Ok(text) if text.is_empty() => NO_RESULT_TEXT.to_owned(),
                Ok(text) => text,
                Err(err) => {
                    let msg = format!("{:#}", err);
                    warn!(%source, "OCR failed: {}", msg);
                    result.errors.push(msg.clone());
                    format!("Error extracting result: {}", msg)
                }
            }
        } else {
            self.process_chunks(&result.name, &submission.requests, &mut result.errors)
                .await
        };

        result.status = if result.errors.is_empty() {
            WorkStatus::Ok
        } else if result.errors.len() < result.chunk_count {
            WorkStatus::Incomplete
        } else {
            WorkStatus::Failed
        };
        result.text = match &self.config.normalizer {
            Some(normalizer) => normalizer.normalize(&text),
            None => text,
        };
        result
    }

    /// OCR each chunk in order and join the results.
    async fn process_chunks(
        &self,
        name: &str,
        requests: &[OcrRequest],
        errors: &mut Vec<String>,
    ) -> String {
        let pb = self
            .ui
            .new_chunk_progress_bar(format!("Chunks of {}", name), requests.len() as u64);
        let mut texts = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let text = match self.call(request).await {
                Ok(text) => text,
                Err(err) => {
                    let msg = format!("{:#}", err);
                    warn!(chunk = i + 1, "OCR failed: {}", msg);
                    errors.push(format!("chunk {}: {}", i + 1, msg));
                    format!("Error extracting result for chunk {}: {}", i + 1, msg)
                }
            };
            texts.push(text);
            pb.inc(1);
        }
        texts.join("\n\n")
    }

    /// Make a single paced OCR call, returning the joined page text.
    async fn call(&self, request: &OcrRequest) -> Result<String> {
        self.pacer.before_call().await;
        let response = self.engine.ocr(request).await;
        self.pacer.after_call().await;
        Ok(response?.text())
    }

    /// Load `source` and build the requests we need to send.
    async fn prepare(&self, source: &Source) -> Result<Submission> {
        match (self.config.document_type, source) {
            (DocumentType::Image, Source::Url(url)) => Ok(Submission {
                page_count: Some(1),
                requests: vec![self.request(DocumentReference::ImageUrl {
                    image_url: url.to_string(),
                })],
            }),
            (DocumentType::Image, Source::Path(_)) => {
                let data = source.read_bytes(&self.client).await?;
                let mime_type = source
                    .detect_mime_type(&data)
                    .ok_or_else(|| anyhow!("could not detect the image type of {}", source))?;
                let image = Document::from_image_bytes(&mime_type, data)?;
                Ok(Submission {
                    page_count: Some(image.page_count()),
                    requests: vec![self.request(DocumentReference::ImageUrl {
                        image_url: image.to_data_url(),
                    })],
                })
            }
            (DocumentType::Pdf, _) => {
                let data = source.read_bytes(&self.client).await?;
                let max_pages = self.config.pages_per_chunk;
                let chunks = spawn_blocking_propagating_panics(
                    move || -> Result<Vec<Chunk>, chunker::ChunkError> {
                        let document = Document::from_pdf_bytes(data)?;
                        chunker::split(&document, max_pages)
                    },
                )
                .await?
                .with_context(|| format!("failed to split {}", source))?;

                let page_count = chunks.iter().map(Chunk::page_count).sum::<usize>();
                debug!(page_count, chunk_count = chunks.len(), "split document");

                // A URL that fits in one request is passed through as-is.
                let requests = match (source, chunks.as_slice()) {
                    (Source::Url(url), [_]) => vec![self.request(DocumentReference::DocumentUrl {
                        document_url: url.to_string(),
                    })],
                    _ => chunks
                        .iter()
                        .map(|chunk| {
                            self.request(DocumentReference::DocumentUrl {
                                document_url: chunk.document.to_data_url(),
                            })
                        })
                        .collect(),
                };
                Ok(Submission {
                    page_count: Some(page_count),
                    requests,
                })
            }
        }
    }

    fn request(&self, document: DocumentReference) -> OcrRequest {
        OcrRequest {
            document,
            include_image_base64: self.config.include_image_base64,
        }
    }
}
