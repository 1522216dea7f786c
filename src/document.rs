//! Documents and the sources we load them from.

use std::{fmt, str::FromStr};

use clap::ValueEnum;
use reqwest::Url;

use crate::{chunker, data_url::data_url, prelude::*};

/// The MIME type of PDF documents.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Image types the OCR service accepts.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// What kind of documents are we processing?
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentType {
    /// PDF documents, which may be split into chunks.
    #[default]
    Pdf,
    /// PNG or JPEG images.
    Image,
}

/// A loaded document. Immutable once read.
#[derive(Clone, Debug)]
pub struct Document {
    mime_type: String,
    data: Vec<u8>,
    page_count: usize,
}

impl Document {
    /// Parse a PDF, counting its pages.
    pub fn from_pdf_bytes(data: Vec<u8>) -> Result<Self, chunker::ChunkError> {
        let page_count = chunker::page_count(&data)?;
        Ok(Self {
            mime_type: PDF_MIME_TYPE.to_owned(),
            data,
            page_count,
        })
    }

    /// Wrap an image. Images always have exactly one page.
    pub fn from_image_bytes(mime_type: &str, data: Vec<u8>) -> Result<Self> {
        if !SUPPORTED_IMAGE_TYPES.contains(&mime_type) {
            return Err(anyhow!(
                "unsupported image type {} (supported: PNG, JPEG)",
                mime_type
            ));
        }
        Ok(Self {
            mime_type: mime_type.to_owned(),
            data,
            page_count: 1,
        })
    }

    /// The MIME type of this document.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The raw bytes of this document.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// How many pages does this document have?
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Convert to a data URL.
    pub fn to_data_url(&self) -> String {
        data_url(self.mime_type(), &self.data)
    }
}

/// Where a document comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A remotely fetchable URL.
    Url(Url),
    /// A local file.
    Path(PathBuf),
}

impl Source {
    /// Compute the base name for output files. `index` is the zero-based
    /// position of this source in the batch.
    pub fn base_name(&self, index: usize) -> String {
        let file_name = match self {
            Source::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Source::Url(url) => {
                let last = url
                    .path_segments()
                    .and_then(|segments| segments.last())
                    .unwrap_or_default();
                if last.is_empty() || !last.contains('.') {
                    return format!("url_document_{}", index + 1);
                }
                last.to_owned()
            }
        };
        match Path::new(&file_name).file_stem() {
            Some(stem) if !stem.is_empty() => stem.to_string_lossy().into_owned(),
            _ => format!("document_{}", index + 1),
        }
    }

    /// Read the raw bytes of this source, downloading it if necessary.
    #[instrument(level = "debug", skip_all, fields(source = %self))]
    pub async fn read_bytes(&self, client: &reqwest::Client) -> Result<Vec<u8>> {
        match self {
            Source::Path(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {:?}", path.display())),
            Source::Url(url) => {
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("failed to fetch {}", url))?
                    .error_for_status()
                    .with_context(|| format!("failed to fetch {}", url))?;
                let bytes = response
                    .bytes()
                    .await
                    .with_context(|| format!("failed to download body of {}", url))?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Guess the MIME type of this source from its contents, falling back to
    /// its file extension.
    pub fn detect_mime_type(&self, data: &[u8]) -> Option<String> {
        if let Some(kind) = infer::get(data) {
            return Some(kind.mime_type().to_owned());
        }
        let guess = match self {
            Source::Path(path) => mime_guess::from_path(path).first(),
            Source::Url(url) => mime_guess::from_path(url.path()).first(),
        };
        guess.map(|mime| mime.essence_str().to_owned())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("empty document source"));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = Url::parse(s).with_context(|| format!("invalid URL {:?}", s))?;
            Ok(Source::Url(url))
        } else {
            Ok(Source::Path(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{}", url),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_classified_by_scheme() {
        assert!(matches!(
            "https://example.com/a.pdf".parse::<Source>().unwrap(),
            Source::Url(_)
        ));
        assert!(matches!(
            "  scans/a.pdf ".parse::<Source>().unwrap(),
            Source::Path(_)
        ));
        assert!("   ".parse::<Source>().is_err());
    }

    #[test]
    fn base_names_strip_extensions() {
        let source: Source = "scans/report.final.pdf".parse().unwrap();
        assert_eq!(source.base_name(0), "report.final");
        let source: Source = "https://example.com/docs/manual.pdf?x=1".parse().unwrap();
        assert_eq!(source.base_name(0), "manual");
    }

    #[test]
    fn urls_without_file_names_get_numbered_base_names() {
        let source: Source = "https://example.com/".parse().unwrap();
        assert_eq!(source.base_name(2), "url_document_3");
        let source: Source = "https://example.com/download".parse().unwrap();
        assert_eq!(source.base_name(0), "url_document_1");
    }

    #[test]
    fn unsupported_images_are_rejected() {
        assert!(Document::from_image_bytes("image/tiff", vec![1, 2, 3]).is_err());
        let image = Document::from_image_bytes("image/png", vec![1, 2, 3]).unwrap();
        assert_eq!(image.page_count(), 1);
        assert_eq!(image.mime_type(), "image/png");
    }

    #[test]
    fn mime_types_fall_back_to_extensions() {
        let source: Source = "photo.jpg".parse().unwrap();
        assert_eq!(source.detect_mime_type(b"not an image").as_deref(), Some("image/jpeg"));
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(source.detect_mime_type(&png_magic).as_deref(), Some("image/png"));
    }
}
