//! Parallel chunked HTTP content downloader.
//!
//! A download begins with a single ranged probe request that discovers the
//! resource length from the response's `Content-Range` header. The remaining
//! bytes are partitioned into fixed-size chunks, fetched concurrently, and
//! written either to a file at each chunk's own offset or to a sequential
//! byte sink in strict chunk order. Each chunk body transparently resumes
//! from the next unread byte when the connection drops mid-stream.
//!
//! ```no_run
//! use parafetch::{ContentDownloader, DownloaderConfig, ParallelDownloadOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), parafetch::DownloadError> {
//! let downloader = ContentDownloader::new(&DownloaderConfig::default())?;
//! let options = ParallelDownloadOptions::new().with_block_size(8 * 1024 * 1024);
//! let summary = downloader
//!     .download_to_file(
//!         "recording.mp4",
//!         "https://example.com/recordings/1/video",
//!         None,
//!         &options,
//!         true,
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("downloaded {} bytes in {} chunks", summary.total_bytes, summary.chunk_count);
//! # Ok(())
//! # }
//! ```

mod body;
mod config;
mod downloader;
mod error;
mod progress;
mod range;
mod sink;
mod transport;

#[cfg(test)]
mod testing;

pub use config::{DEFAULT_BLOCK_SIZE, DEFAULT_USER_AGENT, DownloaderConfig, ParallelDownloadOptions};
pub use downloader::{ContentDownloader, DownloadSummary};
pub use error::DownloadError;
pub use progress::ProgressCallback;
pub use range::DownloadRange;
pub use transport::{ByteStream, HttpTransport, RangeResponse, RangeTransport};
