//! Per-document download files.

use std::collections::HashSet;

use clap::ValueEnum;
use serde_json::json;

use crate::{
    async_utils::spawn_blocking_propagating_panics, markdown_pdf, prelude::*,
    results::DocumentResult,
};

/// The download formats we can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `{"ocr_result": "..."}`.
    Json,
    /// Plain text.
    Txt,
    /// Markdown.
    Md,
    /// A PDF rendered from the Markdown.
    Pdf,
}

impl OutputFormat {
    /// The file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
            OutputFormat::Md => "md",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Hands out download names, so that sources sharing a base name don't
/// overwrite each other's files.
#[derive(Debug, Default)]
pub struct DownloadNames {
    used: HashSet<String>,
}

impl DownloadNames {
    /// Claim a name for document `id` (zero-based), whose base name is
    /// `name`. The first document keeps its base name. Later ones get
    /// `_{id + 1}` appended.
    pub fn claim(&mut self, name: &str, id: usize) -> String {
        if self.used.insert(name.to_owned()) {
            return name.to_owned();
        }
        let base = format!("{}_{}", name, id + 1);
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        candidate
    }
}

/// The JSON download for `text`.
pub fn json_download(text: &str) -> Result<String> {
    serde_json::to_string_pretty(&json!({ "ocr_result": text }))
        .context("failed to serialize JSON download")
}

/// Write the requested downloads for `result` into `out_dir`, returning the
/// paths we wrote.
///
/// A PDF that fails to render is skipped with a warning. Any other failure is
/// an error.
#[instrument(level = "debug", skip_all, fields(name = %result.name))]
pub async fn write_downloads(
    out_dir: &Path,
    result: &DocumentResult,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create output directory {:?}", out_dir))?;

    let mut written = vec![];
    for &format in formats {
        let data = match format {
            OutputFormat::Json => json_download(&result.text)?.into_bytes(),
            OutputFormat::Txt | OutputFormat::Md => result.text.clone().into_bytes(),
            OutputFormat::Pdf => {
                let text = result.text.clone();
                match spawn_blocking_propagating_panics(move || markdown_pdf::render(&text))
                    .await?
                {
                    Ok(pdf) => pdf,
                    Err(err) => {
                        warn!(name = %result.name, "skipping PDF download: {:#}", err);
                        continue;
                    }
                }
            }
        };
        let path = out_dir.join(format!("{}.{}", result.name, format.extension()));
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("failed to write {:?}", path))?;
        debug!(path = %path.display(), "wrote download");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::WorkStatus;

    fn result(text: &str) -> DocumentResult {
        DocumentResult {
            id: 0,
            source: "scans/report.pdf".to_owned(),
            name: "report".to_owned(),
            status: WorkStatus::Ok,
            errors: vec![],
            page_count: Some(1),
            chunk_count: 1,
            text: text.to_owned(),
        }
    }

    #[test]
    fn duplicate_names_get_the_document_number() {
        let mut names = DownloadNames::default();
        assert_eq!(names.claim("report", 0), "report");
        assert_eq!(names.claim("summary", 1), "summary");
        assert_eq!(names.claim("report", 2), "report_3");
        assert_eq!(names.claim("report_3", 3), "report_3_4");
        assert_eq!(names.claim("report", 2), "report_3_2");
    }

    #[test]
    fn json_downloads_use_two_space_indent() {
        assert_eq!(
            json_download("# Hi\nthere").unwrap(),
            "{\n  \"ocr_result\": \"# Hi\\nthere\"\n}"
        );
    }

    #[tokio::test]
    async fn downloads_are_named_after_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let written = write_downloads(
            &out_dir,
            &result("# Report\n\nHello."),
            &[OutputFormat::Json, OutputFormat::Md, OutputFormat::Pdf],
        )
        .await
        .unwrap();

        let names = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["report.json", "report.md", "report.pdf"]);
        assert_eq!(
            std::fs::read_to_string(out_dir.join("report.md")).unwrap(),
            "# Report\n\nHello."
        );
        assert!(!out_dir.join("report.txt").exists());
    }
}
