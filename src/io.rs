use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::sync::LazyLock;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use indicatif::ProgressStyle;

use crate::error::TaskError;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) static STYLE_TASKS: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("#>-")
});

pub(crate) static STYLE_FILES: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.blue} {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
});

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Create the output directory, including parents, unless it is empty.
pub(crate) fn ensure_dir(dir: &Utf8Path) -> Result<(), TaskError> {
    if dir.as_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|e| TaskError::OutputDir(dir.to_owned(), e))
}

/// The output file of a task. Created empty, then appended to piece by
/// piece; every append is flushed before returning.
pub(crate) struct OutputStream {
    path: Utf8PathBuf,
    file: fs::File,
}

impl OutputStream {
    pub(crate) fn create(path: Utf8PathBuf) -> Result<Self, TaskError> {
        let file = fs::File::create(&path).map_err(|e| TaskError::Write(path.clone(), e))?;
        Ok(Self { path, file })
    }

    pub(crate) fn append(&mut self, text: &str) -> Result<(), TaskError> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| TaskError::Write(self.path.clone(), e))
    }

    pub(crate) fn close(mut self, text: &str) -> Result<Utf8PathBuf, TaskError> {
        self.append(text)?;
        self.file
            .sync_all()
            .map_err(|e| TaskError::Write(self.path.clone(), e))?;
        Ok(self.path)
    }
}

/// Install a `tracing` subscriber printing to stderr, with progress bars
/// drawn by `tracing-indicatif`. The level is read from `RUST_LOG` and
/// defaults to `info`. Does nothing if a subscriber is already installed.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let indicatif = IndicatifLayer::new();

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init();
}
