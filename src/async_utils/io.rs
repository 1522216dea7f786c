//! I/O utilities.
//!
//! Inputs may come from a file or standard input, and outputs may go to a
//! file or standard output. We keep that choice, plus JSONL record writing,
//! in this file.

use tokio::{
    fs::File,
    io::{AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::{document::Source, prelude::*};

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Read a UTF-8 text file, or standard input if `path` is `None` or `-`.
pub async fn read_text(path: Option<&Path>) -> Result<String> {
    let mut data = String::new();
    match path {
        Some(path) if path != Path::new("-") => {
            let mut file = File::open(path)
                .await
                .with_context(|| format!("Failed to open file at path: {:?}", path))?;
            file.read_to_string(&mut data)
                .await
                .with_context(|| format!("Failed to read file at path: {:?}", path))?;
        }
        _ => {
            tokio::io::stdin()
                .read_to_string(&mut data)
                .await
                .context("Failed to read standard input")?;
        }
    }
    Ok(data)
}

/// Write `data` to a file, or to standard output if `path` is `None`.
pub async fn write_bytes(path: Option<&Path>, data: &[u8]) -> Result<()> {
    let mut wtr = create_writer(path).await?;
    wtr.write_all(data).await.context("Failed to write output")?;
    wtr.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Parse a list of sources, one per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn parse_source_list(text: &str) -> Result<Vec<Source>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.parse::<Source>())
        .collect()
}

/// Read a list of sources from a file or standard input.
pub async fn read_source_list(path: &Path) -> Result<Vec<Source>> {
    let text = read_text(Some(path)).await?;
    parse_source_list(&text)
        .with_context(|| format!("Failed to parse source list {:?}", path))
}

/// Writes one JSON record per line to a file or standard output.
pub struct JsonlWriter {
    writer: BufWriter<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>>,
}

impl JsonlWriter {
    /// Create a writer for `path`, or for standard output.
    pub async fn create(path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(create_writer(path).await?),
        })
    }

    /// Write a single record.
    pub async fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let json =
            serde_json::to_string(record).context("Failed to serialize output record")?;
        self.writer
            .write_all(json.as_bytes())
            .await
            .context("Failed to write JSON to output")?;
        self.writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
        // Flush per record so partial batches are visible.
        self.writer.flush().await.context("Failed to flush output")
    }

    /// Flush and close the output.
    pub async fn finish(mut self) -> Result<()> {
        self.writer.flush().await.context("Failed to flush output")?;
        self.writer
            .shutdown()
            .await
            .context("Failed to close output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_lists_skip_blanks_and_comments() {
        let sources = parse_source_list(
            "https://example.com/a.pdf\n\n  # a comment\n  local/b.pdf  \n",
        )
        .unwrap();
        assert_eq!(sources.len(), 2);
        assert!(matches!(sources[0], Source::Url(_)));
        assert_eq!(sources[1], Source::Path(PathBuf::from("local/b.pdf")));
    }

    #[tokio::test]
    async fn jsonl_records_are_newline_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut wtr = JsonlWriter::create(Some(&path)).await.unwrap();
        wtr.write_record(&serde_json::json!({ "id": 0 })).await.unwrap();
        wtr.write_record(&serde_json::json!({ "id": 1 })).await.unwrap();
        wtr.finish().await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"id\":0}\n{\"id\":1}\n");
    }
}
