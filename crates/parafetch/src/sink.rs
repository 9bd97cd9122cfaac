//! Sink writers: route one chunk's bytes to the download target.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::DownloadError;
use crate::progress::ProgressTracker;
use crate::transport::ByteStream;

/// Write target for chunk bodies. One writer instance lives for one download
/// call and is shared by all concurrent chunk handlers.
pub(crate) trait ChunkWriter: Send + Sync {
    /// Consumes chunk `index`'s byte sequence, recording progress for every
    /// buffer transferred.
    async fn write_chunk(&self, index: u64, body: ByteStream) -> Result<(), DownloadError>;

    /// Called once after every chunk has been written successfully.
    async fn finish(&self) -> Result<(), DownloadError>;
}

#[cfg(unix)]
fn write_all_at(file: &std::fs::File, buffer: &[u8], position: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buffer, position)
}

#[cfg(windows)]
fn write_all_at(file: &std::fs::File, buffer: &[u8], position: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0usize;
    while written < buffer.len() {
        let n = file.seek_write(&buffer[written..], position + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

/// File target: every chunk writes at `index * block_size`. Writes from
/// different chunks never overlap, so they proceed fully concurrently with no
/// locking beyond the positional-write safety of the handle itself.
pub(crate) struct FileWriter {
    file: Arc<std::fs::File>,
    block_size: u64,
    progress: Arc<ProgressTracker>,
}

impl FileWriter {
    pub(crate) fn new(file: std::fs::File, block_size: u64, progress: Arc<ProgressTracker>) -> Self {
        Self {
            file: Arc::new(file),
            block_size,
            progress,
        }
    }
}

impl ChunkWriter for FileWriter {
    async fn write_chunk(&self, index: u64, mut body: ByteStream) -> Result<(), DownloadError> {
        let mut position = index * self.block_size;

        while let Some(buffer) = body.next().await {
            let buffer = buffer?;
            let len = buffer.len() as u64;
            let file = Arc::clone(&self.file);

            // Positional writes are blocking syscalls; keep them off the
            // reactor threads.
            tokio::task::spawn_blocking(move || write_all_at(&file, &buffer, position))
                .await
                .map_err(|join| DownloadError::internal(format!("file write task failed: {join}")))??;

            position += len;
            self.progress.record(len);
        }

        trace!(chunk = index, "Chunk written to file");
        Ok(())
    }

    async fn finish(&self) -> Result<(), DownloadError> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(|join| DownloadError::internal(format!("file sync task failed: {join}")))??;
        Ok(())
    }
}

struct OrderedFlush<W> {
    writer: W,
    next_index: u64,
    pending: BTreeMap<u64, Vec<Bytes>>,
}

/// Sequential-stream target. A byte stream has no addressable offset, so
/// chunks completing out of index order are buffered whole and flushed
/// strictly in index order.
pub(crate) struct StreamWriter<W> {
    state: tokio::sync::Mutex<OrderedFlush<W>>,
    progress: Arc<ProgressTracker>,
}

impl<W> StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(writer: W, progress: Arc<ProgressTracker>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(OrderedFlush {
                writer,
                next_index: 0,
                pending: BTreeMap::new(),
            }),
            progress,
        }
    }
}

impl<W> ChunkWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&self, index: u64, mut body: ByteStream) -> Result<(), DownloadError> {
        // Buffer the whole chunk first; bytes count as progress only once
        // their turn comes and they reach the sink.
        let mut buffers = Vec::new();
        while let Some(buffer) = body.next().await {
            buffers.push(buffer?);
        }

        let mut state = self.state.lock().await;
        if index != state.next_index {
            trace!(chunk = index, waiting_for = state.next_index, "Buffering out-of-order chunk");
            state.pending.insert(index, buffers);
            return Ok(());
        }

        for buffer in buffers {
            state.writer.write_all(&buffer).await?;
            self.progress.record(buffer.len() as u64);
        }
        state.next_index += 1;

        // Flush any consecutive chunks that were parked behind this one.
        loop {
            let next = state.next_index;
            let Some(buffers) = state.pending.remove(&next) else {
                break;
            };
            for buffer in buffers {
                state.writer.write_all(&buffer).await?;
                self.progress.record(buffer.len() as u64);
            }
            state.next_index += 1;
        }
        Ok(())
    }

    async fn finish(&self) -> Result<(), DownloadError> {
        let mut state = self.state.lock().await;
        if !state.pending.is_empty() {
            return Err(DownloadError::internal(
                "stream sink finished with unflushed chunks",
            ));
        }
        state.writer.flush().await?;
        Ok(())
    }
}
