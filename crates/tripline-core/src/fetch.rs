//! HTTP download into a local scratch file with read-stall detection.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a blocking interface: the orchestrator resolves one file at a
//! time and never suspends cooperatively.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::ProgressBar;

use crate::progress::{SharedProgress, upgrade_to_bar};

/// Buffer size for the scratch file writer (256KB)
const WRITE_BUF_SIZE: usize = 256 * 1024;

/// Shared tokio runtime for HTTP and object store operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Timeouts applied to every download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// No bytes for this long = stall
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Why a download did not produce a local file.
#[derive(Debug)]
pub enum FetchError {
    /// The archive has no object at this URL. Routine: the archive has gaps.
    NotFound { url: String, status: u16 },
    /// Network, protocol or unexpected-status failure
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// Writing the scratch file failed
    Io(io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { url, status } => write!(f, "HTTP {status}: not found: {url}"),
            Self::Transport {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Transport {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create transport error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Classify a non-success response status.
    ///
    /// 404 and 410 mean the month is absent from the archive; everything else
    /// is a transport-level fault.
    pub fn from_status(url: &str, status: u16) -> Self {
        match status {
            404 | 410 => Self::NotFound {
                url: url.to_string(),
                status,
            },
            _ => Self::Transport {
                status: Some(status),
                message: format!("unexpected response for {url}"),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Downloads a URL into a caller-chosen local path.
///
/// Implementations create exactly one file at `dest` and leave it in place on
/// failure; removing it is the caller's job.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, FetchError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
        (**self).fetch(url, dest)
    }
}

/// Streaming HTTP GET fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    read_timeout: Duration,
    progress: Option<SharedProgress>,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FetchError::from_reqwest(&e))?;
        Ok(Self {
            client,
            read_timeout: config.read_timeout,
            progress: None,
        })
    }

    /// Show a byte progress bar per download (TTY only).
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn bar_for(&self, dest: &Path) -> ProgressBar {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &self.progress {
            Some(progress) => progress.download_bar(&name),
            None => ProgressBar::hidden(),
        }
    }

    async fn fetch_async(&self, url: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        if let Some(total) = response.content_length() {
            upgrade_to_bar(pb, total);
        }

        let mut out = BufWriter::with_capacity(WRITE_BUF_SIZE, File::create(dest)?);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let next = tokio::time::timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| FetchError::Transport {
                    status: None,
                    message: format!(
                        "read timeout ({}s with no data)",
                        self.read_timeout.as_secs()
                    ),
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(&e))?;
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }

        out.flush()?;
        Ok(written)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
        let pb = self.bar_for(dest);
        pb.set_message("downloading...");
        let result = SHARED_RUNTIME
            .handle()
            .block_on(self.fetch_async(url, dest, &pb));
        pb.finish_and_clear();

        let written = result?;
        log::debug!("{url}: {written} bytes -> {}", dest.display());
        Ok(dest.to_path_buf())
    }
}
