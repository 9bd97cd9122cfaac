//! Resumable response body: one chunk's bytes as a continuous sequence that
//! survives mid-stream interruptions.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::DownloadError;
use crate::range::DownloadRange;
use crate::transport::{ByteStream, RangeResponse, RangeTransport};

/// Mid-stream resume budget. Interruptions beyond this surface the last
/// underlying error to the caller.
pub(crate) const MAX_RESUME_ATTEMPTS: u32 = 4;

fn accepts(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::OK || status == reqwest::StatusCode::PARTIAL_CONTENT
}

/// Wraps an already-received response into a logical byte stream for `range`.
///
/// While consuming the body, an error after `N` bytes have been emitted
/// re-issues a ranged GET starting at `range.offset + N` and splices the new
/// body onto the sequence, preserving exactly-once delivery. Up to
/// [`MAX_RESUME_ATTEMPTS`] resumes are attempted; a non-200/206 status on any
/// underlying response (initial or resumed) is a hard failure, never retried
/// here.
pub(crate) fn resumable_body(
    transport: Arc<dyn RangeTransport>,
    url: Url,
    range: DownloadRange,
    initial: RangeResponse,
    token: CancellationToken,
) -> ByteStream {
    let (tx, rx) = mpsc::channel::<Result<bytes::Bytes, DownloadError>>(2);

    tokio::spawn(async move {
        let mut emitted: u64 = 0;
        let mut attempts: u32 = 0;
        let mut response = Some(initial);

        'attempt: loop {
            let current = match response.take() {
                Some(current) => current,
                None => {
                    let resume_range = range.resume_from(emitted);
                    debug!(
                        url = %url,
                        attempt = attempts,
                        resume_offset = resume_range.offset,
                        "Resuming interrupted body"
                    );
                    match transport.get(&url, Some(&resume_range)).await {
                        Ok(resumed) => resumed,
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }
                }
            };

            if !accepts(current.status) {
                let _ = tx
                    .send(Err(DownloadError::http_status(
                        current.status,
                        url.as_str(),
                        "chunk body",
                    )))
                    .await;
                return;
            }

            let mut body = current.body;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = tx.send(Err(DownloadError::Cancelled)).await;
                        return;
                    }
                    next = body.next() => match next {
                        Some(Ok(buffer)) => {
                            emitted += buffer.len() as u64;
                            if tx.send(Ok(buffer)).await.is_err() {
                                // Receiver dropped; nothing left to deliver.
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            if attempts >= MAX_RESUME_ATTEMPTS {
                                warn!(
                                    url = %url,
                                    attempts,
                                    error = %err,
                                    "Resume budget exhausted"
                                );
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                            attempts += 1;
                            warn!(
                                url = %url,
                                attempt = attempts,
                                emitted,
                                error = %err,
                                "Body interrupted, will resume"
                            );
                            continue 'attempt;
                        }
                        None => return,
                    }
                }
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}
