//! The `normalize` subcommand.

use clap::Args;

use crate::{
    async_utils::io::{read_text, write_bytes},
    normalize::{DEFAULT_MAX_LENGTH_CHANGE, Normalizer, parse_max_length_change},
    prelude::*,
};

/// Options for the `normalize` subcommand.
#[derive(Args, Debug)]
pub struct NormalizeOpts {
    /// Markdown to clean up. Defaults to standard input.
    pub input_path: Option<PathBuf>,

    /// Where to write the cleaned text. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Discard cleanup if it changes the text length by more than this
    /// fraction.
    #[clap(long, default_value_t = DEFAULT_MAX_LENGTH_CHANGE, value_parser = parse_max_length_change)]
    pub max_length_change: f64,
}

/// The `normalize` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_normalize(opts: &NormalizeOpts) -> Result<()> {
    let text = read_text(opts.input_path.as_deref()).await?;
    let cleaned = Normalizer::new(opts.max_length_change).normalize(&text);
    write_bytes(opts.output_path.as_deref(), cleaned.as_bytes()).await
}
