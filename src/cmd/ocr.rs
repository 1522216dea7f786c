//! The `ocr` subcommand.

use std::num::NonZeroUsize;

use clap::Args;

use crate::{
    async_utils::io::{JsonlWriter, read_source_list},
    document::{DocumentType, Source},
    normalize::{DEFAULT_MAX_LENGTH_CHANGE, Normalizer, parse_max_length_change},
    ocr::{
        OcrOpts,
        batch::{BatchConfig, BatchProcessor},
    },
    output::{DownloadNames, OutputFormat, write_downloads},
    prelude::*,
    results::ResultStore,
    ui::{ProgressConfig, Ui},
};

/// Options for the `ocr` subcommand.
#[derive(Args, Debug)]
pub struct OcrCmdOpts {
    /// PDFs or images to OCR, as URLs or local paths.
    #[clap(value_name = "SOURCE")]
    pub sources: Vec<Source>,

    /// Read additional sources from this file, one per line. Use `-` for
    /// standard input.
    #[clap(long)]
    pub url_list: Option<PathBuf>,

    /// What kind of documents are we processing?
    #[clap(long, value_enum, default_value_t = DocumentType::default())]
    pub document_type: DocumentType,

    /// The most pages to send in a single OCR request.
    #[clap(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(50..=200))]
    pub pages_per_chunk: u16,

    #[clap(flatten)]
    pub ocr_opts: OcrOpts,

    /// Skip cleaning up the OCR output.
    #[clap(long)]
    pub raw: bool,

    /// Discard cleanup if it changes the text length by more than this
    /// fraction.
    #[clap(long, default_value_t = DEFAULT_MAX_LENGTH_CHANGE, value_parser = parse_max_length_change)]
    pub max_length_change: f64,

    /// Write download files for each document into this directory.
    #[clap(long)]
    pub out_dir: Option<PathBuf>,

    /// Download formats to write into `--out-dir`.
    #[clap(
        long = "format",
        value_enum,
        value_delimiter = ',',
        default_value = "json,txt,md"
    )]
    pub formats: Vec<OutputFormat>,

    /// Write JSONL records to this path instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// What portion of documents should we allow to fail? Specified as a
    /// number between 0.0 and 1.0.
    #[clap(long, default_value = "0.01")]
    pub allowed_failure_rate: f32,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrCmdOpts) -> Result<()> {
    // Collect our sources.
    let mut sources = opts.sources.clone();
    if let Some(url_list) = &opts.url_list {
        sources.extend(read_source_list(url_list).await?);
    }
    if sources.is_empty() {
        return Err(anyhow!("no documents to OCR (pass sources or --url-list)"));
    }

    let pages_per_chunk = NonZeroUsize::new(usize::from(opts.pages_per_chunk))
        .ok_or_else(|| anyhow!("--pages-per-chunk must be positive"))?;
    let processor = BatchProcessor::new(
        ui.clone(),
        opts.ocr_opts.create_engine()?,
        opts.ocr_opts.create_pacer()?,
        BatchConfig {
            document_type: opts.document_type,
            pages_per_chunk,
            include_image_base64: opts.ocr_opts.include_image_base64,
            normalizer: (!opts.raw).then(|| Normalizer::new(opts.max_length_change)),
            download_timeout: opts.ocr_opts.request_timeout(),
        },
    )?;

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "OCRing documents",
            done_msg: "OCRed documents",
        },
        sources.len() as u64,
    );

    let mut output = JsonlWriter::create(opts.output_path.as_deref()).await?;
    let mut results = ResultStore::new();
    let mut names = DownloadNames::default();
    for (index, source) in sources.iter().enumerate() {
        let mut result = processor.process_source(index, source).await;
        result.name = names.claim(&result.name, result.id);
        if let Some(out_dir) = &opts.out_dir {
            write_downloads(out_dir, &result, &opts.formats).await?;
        }
        output.write_record(&result).await?;
        results.push(result);
        pb.inc(1);
    }
    output.finish().await?;
    drop(pb);

    let pages = results.iter().filter_map(|r| r.page_count).sum::<usize>();
    info!(documents = results.len(), pages, "finished OCR batch");
    results.finish(&ui, opts.allowed_failure_rate)
}
