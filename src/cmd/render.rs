//! The `render` subcommand.

use clap::Args;

use crate::{
    async_utils::{
        io::{read_text, write_bytes},
        spawn_blocking_propagating_panics,
    },
    markdown_pdf,
    prelude::*,
};

/// Options for the `render` subcommand.
#[derive(Args, Debug)]
pub struct RenderOpts {
    /// Markdown to render. Defaults to standard input.
    pub input_path: Option<PathBuf>,

    /// Where to write the PDF.
    #[clap(short = 'o', long = "out")]
    pub output_path: PathBuf,
}

/// The `render` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_render(opts: &RenderOpts) -> Result<()> {
    let text = read_text(opts.input_path.as_deref()).await?;
    let pdf = spawn_blocking_propagating_panics(move || markdown_pdf::render(&text)).await??;
    write_bytes(Some(&opts.output_path), &pdf).await
}
