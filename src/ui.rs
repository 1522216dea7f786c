//! Terminal UI: progress bars over documents and chunks, plus a stderr
//! writer that `tracing` can share with them.

use std::{
    borrow::Cow,
    io,
    sync::Arc,
    time::Duration,
};

use indicatif::{
    MultiProgress, ProgressBar, ProgressDrawTarget, ProgressFinish, ProgressStyle,
};

/// Shared handle to our progress bars. Cheap to clone.
#[derive(Clone)]
pub struct Ui {
    bars: Arc<MultiProgress>,
}

impl Ui {
    /// Create a new UI drawing to stderr.
    pub fn init() -> Ui {
        Ui {
            bars: Arc::new(MultiProgress::new()),
        }
    }

    /// Create a UI which never draws anything.
    #[cfg(test)]
    pub fn init_for_tests() -> Ui {
        Ui {
            bars: Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden())),
        }
    }

    /// Stop drawing progress bars. Used when real output goes to stdout.
    pub fn hide_progress_bars(&self) {
        self.bars.set_draw_target(ProgressDrawTarget::hidden());
    }

    /// A stderr writer for `tracing` that won't tear our progress bars.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    fn add(&self, pb: ProgressBar, prefix: &str, msg: String) -> ProgressBar {
        let pb = self.bars.add(pb);
        #[cfg(test)]
        pb.set_draw_target(ProgressDrawTarget::hidden());
        pb.set_prefix(prefix.to_owned());
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(250));
        pb
    }

    /// Create the top-level progress bar for a batch.
    pub fn new_progress_bar(&self, config: &ProgressConfig<'_>, len: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(
                "  {prefix:3}{msg:25} {pos:>4}/{len:4} {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}",
            )
            .expect("bad progress bar template");
        self.add(
            ProgressBar::new(len).with_style(style),
            config.emoji,
            config.msg.to_owned(),
        )
        .with_finish(ProgressFinish::WithMessage(Cow::Owned(
            config.done_msg.to_owned(),
        )))
    }

    /// Create a nested progress bar over the chunks of one document. It
    /// disappears when dropped.
    pub fn new_chunk_progress_bar(&self, msg: String, len: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template("    {prefix:3}{msg:40} {pos:>3}/{len:3} {wide_bar:.green/blue}")
            .expect("bad progress bar template");
        self.add(ProgressBar::new(len).with_style(style), "🧩", msg)
            .with_finish(ProgressFinish::AndClear)
    }

    /// Print a one-line message above the progress bars.
    pub fn display_message(&self, emoji: &str, msg: &str) {
        let line = format!("{emoji} {msg}");
        if self.bars.println(&line).is_err() {
            eprintln!("{line}");
        }
    }
}

/// Labels for a top-level progress bar.
pub struct ProgressConfig<'a> {
    /// Shown before the message.
    pub emoji: &'a str,
    /// Shown while running.
    pub msg: &'a str,
    /// Shown once finished.
    pub done_msg: &'a str,
}

/// Writes to stderr with our progress bars suspended, so log lines and bars
/// don't overwrite each other.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

impl SafeStderrWriter {
    fn suspended<R>(&self, f: impl FnOnce(&mut io::Stderr) -> R) -> R {
        self.ui.bars.suspend(|| f(&mut io::stderr()))
    }
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.suspended(|err| io::Write::write(err, buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.suspended(|err| io::Write::write_all(err, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.suspended(io::Write::flush)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
