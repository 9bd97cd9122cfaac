//! Parallel chunked content downloader.
//!
//! One download call probes the resource length with a first ranged GET,
//! partitions the remainder into block-sized chunks, fetches the chunks
//! concurrently and routes each body to an offset-addressed sink write. The
//! probe response doubles as chunk 0, so exactly one request is issued per
//! chunk.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::body::resumable_body;
use crate::config::{DownloaderConfig, ParallelDownloadOptions};
use crate::error::DownloadError;
use crate::progress::ProgressTracker;
use crate::range::{self, DownloadRange};
use crate::sink::{ChunkWriter, FileWriter, StreamWriter};
use crate::transport::{ByteStream, HttpTransport, RangeResponse, RangeTransport};

/// Outcome of a completed download: the first response's status and headers
/// plus transfer accounting.
#[derive(Debug)]
pub struct DownloadSummary {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub total_bytes: u64,
    pub chunk_count: u64,
}

struct ProbeOutcome {
    resolved_len: u64,
    response: RangeResponse,
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn parse_url(input: &str) -> Result<Url, DownloadError> {
    input
        .parse::<Url>()
        .map_err(|err| DownloadError::invalid_url(input, err.to_string()))
}

/// Issues the length-discovering first request.
///
/// The probe covers `min(requested.length, block_size)` bytes from the
/// requested offset. The total resource length comes from the response's
/// `Content-Range` header and the requested length is clamped to the bytes
/// actually remaining past the offset.
///
/// A 416 whose `Content-Range` reports total length 0 (missing or malformed
/// headers read as 0) triggers one unranged re-probe. Any syntactically valid
/// `Range` header is unsatisfiable against a zero-length resource, so only a
/// request without one can draw a 200 out of a conforming server. A 200 with
/// no body bytes confirms a legitimately empty resource; anything else means
/// the resource grew between the two requests and the download is aborted.
async fn probe(
    transport: &Arc<dyn RangeTransport>,
    url: &Url,
    requested: &DownloadRange,
    block_size: u64,
) -> Result<ProbeOutcome, DownloadError> {
    let probe_len = requested.length.map_or(block_size, |len| len.min(block_size));
    let probe_range = DownloadRange::new(requested.offset, Some(probe_len));
    let response = transport.get(url, Some(&probe_range)).await?;

    match response.status {
        StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
            let total = range::total_length(response.content_range());
            let remaining = total.saturating_sub(requested.offset);
            let resolved_len = requested.length.map_or(remaining, |len| len.min(remaining));
            debug!(url = %url, total, resolved_len, "Probe resolved resource length");
            Ok(ProbeOutcome {
                resolved_len,
                response,
            })
        }
        StatusCode::RANGE_NOT_SATISFIABLE
            if range::total_length(response.content_range()) == 0 =>
        {
            // Possibly an empty resource; confirm with an unranged request
            // so the caller still gets one real response (and its headers).
            debug!(url = %url, "Probe hit 416 with zero total, re-probing for empty resource");
            let reprobe = transport.get(url, None).await?;
            if reprobe.status == StatusCode::OK && content_length(&reprobe.headers) == 0 {
                Ok(ProbeOutcome {
                    resolved_len: 0,
                    response: reprobe,
                })
            } else {
                Err(DownloadError::resource_modified(
                    "resource was zero bytes at probe time and is now larger",
                ))
            }
        }
        status => Err(DownloadError::http_status(status, url.as_str(), "range probe")),
    }
}

/// Fetches and writes one chunk. Chunk 0 reuses the probe response instead of
/// issuing a new request; every body goes through the resumable reader before
/// reaching the sink.
async fn run_chunk<W: ChunkWriter>(
    transport: Arc<dyn RangeTransport>,
    url: Url,
    index: u64,
    chunk_range: DownloadRange,
    initial: Option<RangeResponse>,
    writer: &W,
    token: CancellationToken,
) -> Result<(), DownloadError> {
    let response = match initial {
        Some(response) => response,
        None => transport.get(&url, Some(&chunk_range)).await?,
    };

    let body = resumable_body(transport, url, chunk_range, response, token);
    writer.write_chunk(index, body).await
}

/// Client-side orchestrator for ranged, parallel, resumable downloads over a
/// generic HTTP transport.
pub struct ContentDownloader {
    transport: Arc<dyn RangeTransport>,
}

impl ContentDownloader {
    /// Creates a downloader backed by a reqwest client built from `config`.
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            transport: Arc::new(HttpTransport::new(config)?),
        })
    }

    /// Creates a downloader over a caller-provided transport.
    pub fn with_transport(transport: Arc<dyn RangeTransport>) -> Self {
        Self { transport }
    }

    /// Streams the resource over a single connection, resuming transparently
    /// on mid-stream interruptions. No parallel chunking is involved.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn download_streaming(
        &self,
        url: &str,
        range: Option<DownloadRange>,
        token: CancellationToken,
    ) -> Result<ByteStream, DownloadError> {
        let url = parse_url(url)?;
        let response = self.transport.get(&url, range.as_ref()).await?;

        match response.status {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(resumable_body(
                Arc::clone(&self.transport),
                url,
                range.unwrap_or_default(),
                response,
                token,
            )),
            status => Err(DownloadError::http_status(
                status,
                url.as_str(),
                "streaming download",
            )),
        }
    }

    /// Downloads the resource into a sequential byte sink, fetching chunks in
    /// parallel. Chunks completing out of order are buffered and flushed
    /// strictly by chunk index, so the sink always receives bytes in resource
    /// order.
    #[instrument(skip(self, writer, options, token), level = "debug")]
    pub async fn download_to_stream<W>(
        &self,
        writer: W,
        url: &str,
        range: Option<DownloadRange>,
        options: &ParallelDownloadOptions,
        token: CancellationToken,
    ) -> Result<DownloadSummary, DownloadError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let progress = Arc::new(ProgressTracker::new(options.progress()));
        let sink = StreamWriter::new(writer, Arc::clone(&progress));
        self.download_to(url, range.unwrap_or_default(), options, &sink, &progress, token)
            .await
    }

    /// Downloads the resource into a file, fetching chunks in parallel. Each
    /// chunk writes at `index * block_size`, so completion order does not
    /// affect the final byte layout. On failure the handle is closed and the
    /// partial file deleted.
    ///
    /// With `overwrite` false the call fails if `path` already exists, before
    /// any network activity.
    #[instrument(skip(self, options, token), level = "debug")]
    pub async fn download_to_file(
        &self,
        path: impl AsRef<Path> + std::fmt::Debug,
        url: &str,
        range: Option<DownloadRange>,
        options: &ParallelDownloadOptions,
        overwrite: bool,
        token: CancellationToken,
    ) -> Result<DownloadSummary, DownloadError> {
        let path = path.as_ref();

        let mut open_options = tokio::fs::OpenOptions::new();
        open_options.write(true);
        if overwrite {
            open_options.create(true);
        } else {
            open_options.create_new(true);
        }

        let file = open_options.open(path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                DownloadError::DestinationExists {
                    path: path.display().to_string(),
                }
            } else {
                DownloadError::from(err)
            }
        })?;

        let progress = Arc::new(ProgressTracker::new(options.progress()));
        let sink = FileWriter::new(
            file.into_std().await,
            options.block_size(),
            Arc::clone(&progress),
        );

        let result = self
            .download_to(url, range.unwrap_or_default(), options, &sink, &progress, token)
            .await;

        if let Err(err) = &result {
            warn!(path = %path.display(), error = %err, "Download failed, removing partial file");
            drop(sink);
            if let Err(cleanup) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove partial file");
            }
        }
        result
    }

    /// Shared probe-partition-dispatch pipeline behind both sink shapes.
    async fn download_to<W: ChunkWriter>(
        &self,
        url: &str,
        range: DownloadRange,
        options: &ParallelDownloadOptions,
        writer: &W,
        progress: &ProgressTracker,
        token: CancellationToken,
    ) -> Result<DownloadSummary, DownloadError> {
        let url = parse_url(url)?;
        let block_size = options.block_size();
        if block_size == 0 {
            return Err(DownloadError::configuration("block size must be non-zero"));
        }

        let outcome = probe(&self.transport, &url, &range, block_size).await?;
        let resolved_len = outcome.resolved_len;
        let chunk_count = range::chunk_count(resolved_len, block_size);
        let status = outcome.response.status;
        let headers = outcome.response.headers.clone();

        info!(
            url = %url,
            resolved_len,
            chunk_count,
            block_size,
            "Starting parallel download"
        );

        let mut first_response = Some(outcome.response);
        let mut tasks = FuturesUnordered::new();
        for index in 0..chunk_count {
            let chunk_range = range::chunk_range(index, range.offset, resolved_len, block_size);
            tasks.push(run_chunk(
                Arc::clone(&self.transport),
                url.clone(),
                index,
                chunk_range,
                if index == 0 { first_response.take() } else { None },
                writer,
                token.clone(),
            ));
        }

        // First failure wins; dropping the remaining futures abandons the
        // in-flight sibling requests.
        while let Some(result) = tasks.next().await {
            result?;
        }
        drop(tasks);

        writer.finish().await?;

        debug!(url = %url, total_bytes = progress.total(), "Download complete");
        Ok(DownloadSummary {
            status,
            headers,
            total_bytes: progress.total(),
            chunk_count,
        })
    }
}
