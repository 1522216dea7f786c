//! The `split` subcommand.

use std::num::NonZeroUsize;

use clap::Args;

use crate::{
    async_utils::spawn_blocking_propagating_panics, chunker, document::Document,
    prelude::*, ui::Ui,
};

/// Options for the `split` subcommand.
#[derive(Args, Debug)]
pub struct SplitOpts {
    /// The PDF to split.
    pub input_path: PathBuf,

    /// The directory to write chunks into.
    #[clap(long)]
    pub out_dir: PathBuf,

    /// The most pages per chunk.
    #[clap(long, default_value = "100")]
    pub pages_per_chunk: NonZeroUsize,
}

/// The `split` subcommand. Writes `<stem>_part_<n>.pdf` for each chunk.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_split(ui: Ui, opts: &SplitOpts) -> Result<()> {
    let data = tokio::fs::read(&opts.input_path)
        .await
        .with_context(|| format!("failed to read {:?}", opts.input_path))?;
    let max_pages = opts.pages_per_chunk;
    let chunks = spawn_blocking_propagating_panics(move || {
        chunker::split(&Document::from_pdf_bytes(data)?, max_pages)
    })
    .await?
    .with_context(|| format!("failed to split {:?}", opts.input_path))?;

    let stem = opts
        .input_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_owned());
    tokio::fs::create_dir_all(&opts.out_dir)
        .await
        .with_context(|| format!("failed to create output directory {:?}", opts.out_dir))?;
    for chunk in &chunks {
        let path = opts
            .out_dir
            .join(format!("{}_part_{}.pdf", stem, chunk.index + 1));
        tokio::fs::write(&path, chunk.document.data())
            .await
            .with_context(|| format!("failed to write {:?}", path))?;
        debug!(path = %path.display(), pages = ?chunk.pages, "wrote chunk");
    }
    ui.display_message("✂️", &format!("Wrote {} chunks", chunks.len()));
    Ok(())
}
