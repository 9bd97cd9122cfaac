use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::progress::ProgressCallback;

pub const DEFAULT_USER_AGENT: &str = concat!("parafetch/", env!("CARGO_PKG_VERSION"));

/// Default chunk size for parallel downloads (4 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Configurable options for the underlying HTTP client.
///
/// Timeout policy lives entirely here; the download pipeline itself imposes
/// none.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Overall timeout for a single HTTP request. Zero disables it.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// User agent string.
    pub user_agent: String,

    /// Custom HTTP headers sent with every request.
    pub headers: HeaderMap,

    /// Maximum idle connections to keep per host. Parallel chunk fetches of
    /// the same resource all hit one host, so keep this at least as large as
    /// the typical chunk fan-out.
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing.
    pub pool_idle_timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl DownloaderConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/octet-stream, */*"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers
    }
}

/// Options for one parallel download call. Immutable for the duration of the
/// call.
#[derive(Clone, Default)]
pub struct ParallelDownloadOptions {
    block_size: Option<u64>,
    progress: Option<ProgressCallback>,
}

impl ParallelDownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size in bytes. Validated (non-zero) when the download
    /// call starts, before any network activity.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets a callback invoked with the cumulative number of bytes
    /// transferred after each buffer is written to the destination.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn block_size(&self) -> u64 {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    pub(crate) fn progress(&self) -> Option<ProgressCallback> {
        self.progress.clone()
    }
}

impl std::fmt::Debug for ParallelDownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDownloadOptions")
            .field("block_size", &self.block_size())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
