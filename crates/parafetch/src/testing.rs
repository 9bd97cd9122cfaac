//! Scriptable in-memory transport for exercising the pipeline without a
//! network.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::error::DownloadError;
use crate::range::DownloadRange;
use crate::transport::{RangeResponse, RangeTransport};

/// Installs a fmt subscriber so test runs surface pipeline traces. Safe to
/// call from every test; only the first call wins.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// How the mock serves one response body.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BodyPlan {
    /// Serve the requested slice in full.
    Complete,
    /// Emit the first `n` bytes of the slice, then an I/O error.
    Truncate(usize),
}

/// Transport serving a fixed byte buffer with real range semantics: 206 for
/// satisfiable ranges, 416 with `Content-Range: bytes */<total>` otherwise
/// (every ranged request against an empty resource is unsatisfiable), 200
/// for unranged requests.
pub(crate) struct MockTransport {
    content: Vec<u8>,
    requests: Mutex<Vec<DownloadRange>>,
    body_plans: Mutex<VecDeque<BodyPlan>>,
    forced_status: Mutex<Option<StatusCode>>,
    delays: Mutex<HashMap<u64, Duration>>,
    omit_content_range: Mutex<bool>,
    grown_after_probe: Mutex<bool>,
}

impl MockTransport {
    pub(crate) fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            requests: Mutex::new(Vec::new()),
            body_plans: Mutex::new(VecDeque::new()),
            forced_status: Mutex::new(None),
            delays: Mutex::new(HashMap::new()),
            omit_content_range: Mutex::new(false),
            grown_after_probe: Mutex::new(false),
        }
    }

    /// Queues per-request body behavior; requests beyond the queue serve
    /// complete bodies.
    pub(crate) fn plan_bodies(&self, plans: impl IntoIterator<Item = BodyPlan>) {
        self.body_plans.lock().extend(plans);
    }

    /// Every subsequent response gets this status, empty headers and body.
    pub(crate) fn force_status(&self, status: StatusCode) {
        *self.forced_status.lock() = Some(status);
    }

    /// Sleep before answering requests starting at `offset`.
    pub(crate) fn delay_for_offset(&self, offset: u64, delay: Duration) {
        self.delays.lock().insert(offset, delay);
    }

    /// Drop `Content-Range` from all responses.
    pub(crate) fn omit_content_range(&self) {
        *self.omit_content_range.lock() = true;
    }

    /// Simulate a zero-length resource growing between probe and re-probe:
    /// unranged requests answer 200 with a non-empty body.
    pub(crate) fn grow_after_probe(&self) {
        *self.grown_after_probe.lock() = true;
    }

    pub(crate) fn requests(&self) -> Vec<DownloadRange> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn body_for(&self, slice: &[u8]) -> crate::transport::ByteStream {
        let plan = self
            .body_plans
            .lock()
            .pop_front()
            .unwrap_or(BodyPlan::Complete);

        let (served, interrupt) = match plan {
            BodyPlan::Complete => (slice.to_vec(), false),
            BodyPlan::Truncate(n) => (slice[..n.min(slice.len())].to_vec(), true),
        };

        // Serve in small pieces to exercise the multi-buffer path.
        let mut items: Vec<Result<Bytes, DownloadError>> = served
            .chunks(7)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        if interrupt {
            items.push(Err(DownloadError::from(std::io::Error::other(
                "connection reset by peer",
            ))));
        }
        futures::stream::iter(items).boxed()
    }
}

#[async_trait]
impl RangeTransport for MockTransport {
    async fn get(
        &self,
        _url: &Url,
        range: Option<&DownloadRange>,
    ) -> Result<RangeResponse, DownloadError> {
        let effective = range.copied().unwrap_or_default();
        self.requests.lock().push(effective);

        let delay = self.delays.lock().get(&effective.offset).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = *self.forced_status.lock() {
            return Ok(RangeResponse {
                status,
                headers: HeaderMap::new(),
                body: futures::stream::empty().boxed(),
            });
        }

        let total = self.content.len() as u64;
        let mut headers = HeaderMap::new();

        // The resource grew between requests.
        if range.is_none() && *self.grown_after_probe.lock() {
            headers.insert("content-length", HeaderValue::from_static("5"));
            headers.insert(
                "content-type",
                HeaderValue::from_static("application/octet-stream"),
            );
            return Ok(RangeResponse {
                status: StatusCode::OK,
                headers,
                body: self.body_for(b"grown"),
            });
        }

        // Unsatisfiable range.
        if range.is_some() && effective.offset >= total {
            if !*self.omit_content_range.lock() {
                headers.insert(
                    "content-range",
                    HeaderValue::from_str(&format!("bytes */{total}")).unwrap(),
                );
            }
            return Ok(RangeResponse {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                headers,
                body: futures::stream::empty().boxed(),
            });
        }

        let (status, start, end) = match range {
            None => (StatusCode::OK, 0, total),
            Some(_) => {
                let start = effective.offset;
                let end = match effective.length {
                    Some(len) => (start + len).min(total),
                    None => total,
                };
                (StatusCode::PARTIAL_CONTENT, start, end)
            }
        };

        if status == StatusCode::PARTIAL_CONTENT && !*self.omit_content_range.lock() {
            headers.insert(
                "content-range",
                HeaderValue::from_str(&format!("bytes {start}-{}/{total}", end.saturating_sub(1)))
                    .unwrap(),
            );
        }
        headers.insert(
            "content-length",
            HeaderValue::from_str(&(end - start).to_string()).unwrap(),
        );
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/octet-stream"),
        );

        let slice = &self.content[start as usize..end as usize];
        Ok(RangeResponse {
            status,
            headers,
            body: self.body_for(slice),
        })
    }
}
