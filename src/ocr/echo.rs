//! Echo engine for testing.
//!
//! Inline PDFs come back as one page per PDF page, reading
//! `## Page N\n\nEchoed page N of M.`. Anything else comes back as a single
//! page describing the reference.

use super::{OcrEngine, OcrPage, OcrRequest, OcrResponse};
use crate::{
    chunker,
    data_url::{decode_data_url, parse_data_url},
    document::PDF_MIME_TYPE,
    prelude::*,
};

/// Echo engine for testing.
#[derive(Debug)]
pub struct EchoOcrEngine;

#[async_trait]
impl OcrEngine for EchoOcrEngine {
    async fn ocr(&self, request: &OcrRequest) -> Result<OcrResponse> {
        let url = request.document.url();
        let pages = match parse_data_url(url) {
            Some((PDF_MIME_TYPE, _)) => {
                let (_, data) = decode_data_url(url)?;
                let total = chunker::page_count(&data)?;
                (1..=total)
                    .map(|n| OcrPage {
                        index: n - 1,
                        markdown: format!("## Page {n}\n\nEchoed page {n} of {total}."),
                    })
                    .collect()
            }
            Some((mime_type, data)) => vec![OcrPage {
                index: 0,
                markdown: format!("Echoed {} data ({} Base64 bytes).", mime_type, data.len()),
            }],
            None => vec![OcrPage {
                index: 0,
                markdown: format!("Echoed {}.", url),
            }],
        };
        Ok(OcrResponse { pages })
    }
}
