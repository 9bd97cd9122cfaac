//! HTTP transport seam: the one contract the pipeline requires from the
//! outside world.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::range::DownloadRange;

/// Lazy byte sequence of a response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// One HTTP response as the pipeline sees it. Non-success statuses are
/// returned as values, not errors, so the prober can disambiguate 416
/// responses by their headers; connection-level failures are `Err`.
pub struct RangeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl RangeResponse {
    /// `Content-Range` header value, if present.
    pub fn content_range(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
    }
}

/// Transport capable of issuing a ranged GET.
#[async_trait]
pub trait RangeTransport: Send + Sync {
    /// Sends a GET for `url`, with a `Range` request header when `range` is
    /// given, and returns status, headers and the lazy body.
    async fn get(
        &self,
        url: &Url,
        range: Option<&DownloadRange>,
    ) -> Result<RangeResponse, DownloadError>;
}

/// Builds a reqwest client from the downloader configuration.
pub(crate) fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(config.headers.clone())
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout);

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }

    if !config.follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    builder.build().map_err(DownloadError::from)
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RangeTransport for HttpTransport {
    async fn get(
        &self,
        url: &Url,
        range: Option<&DownloadRange>,
    ) -> Result<RangeResponse, DownloadError> {
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(header::RANGE, range.to_string());
        }

        let response = request.send().await?;
        debug!(url = %url, range = ?range, status = %response.status(), "Ranged GET dispatched");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|result| result.map_err(DownloadError::from))
            .boxed();

        Ok(RangeResponse {
            status,
            headers,
            body,
        })
    }
}
