//! Shared HTTP session for page navigation and file downloads.
//!
//! One [`HttpClient`] is built per run. It owns the cookie jar, so the session
//! established by the navigator's login is the same session every download
//! worker uses. Idempotent requests go through the transport retry loop driven
//! by [`TransportRetryPolicy`]; callers only ever see the final response.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, WRITE_BUFFER_BYTES};
use super::error::DownloadError;
use super::retry::{RetryDecision, TransportRetryPolicy};
use crate::user_agent;

/// Construction-time settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Bound on a single request, connect through last body byte.
    pub request_timeout: Duration,
    /// Bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Transport retry policy for idempotent requests.
    pub retry: TransportRetryPolicy,
    /// User-Agent presented on every request.
    pub user_agent: String,
    /// Skip TLS certificate verification (the portal's certificate chain is
    /// not always complete).
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            retry: TransportRetryPolicy::default(),
            user_agent: user_agent::random_browser_user_agent().to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// A page body together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: Url,
    /// Decoded response body.
    pub body: String,
}

/// Cookie-carrying HTTP session shared by the navigator and all workers.
///
/// Cloning is cheap; clones share the connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: Arc<TransportRetryPolicy>,
}

impl HttpClient {
    /// Builds the session from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if reqwest rejects the
    /// configuration (e.g. the TLS backend fails to initialize).
    pub fn new(settings: &HttpSettings) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .cookie_provider(Arc::new(Jar::default()))
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .gzip(true)
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(DownloadError::ClientBuild)?;

        Ok(Self {
            client,
            retry: Arc::new(settings.retry.clone()),
        })
    }

    /// Fetches a page and returns its final URL and body text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on an invalid URL, a transport failure, or a
    /// non-2xx terminal status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, DownloadError> {
        let response = self.get_with_retry(url).await?;
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }

    /// Posts a form-urlencoded body and returns the page the server lands on.
    ///
    /// POST is never retried at the transport level.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_page`](Self::fetch_page).
    #[instrument(level = "debug", skip(self, form), fields(url = %url))]
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<FetchedPage, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();

        let response = self
            .client
            .post(parsed)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }

    /// Streams `url` into `dest` and returns the number of bytes written.
    ///
    /// The parent directory must already exist. A partially written file is
    /// removed when streaming fails, so a later run does not mistake it for a
    /// completed download.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on transport failure, a non-2xx terminal
    /// status, or a filesystem error.
    #[instrument(level = "debug", skip(self, dest), fields(url = %url, dest = %dest.display()))]
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self.get_with_retry(url).await?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let stream_result = stream_to_file(&mut file, response, url, dest).await;
        if stream_result.is_err() {
            debug!(path = %dest.display(), "cleaning up partial file after error");
            drop(file);
            if let Err(e) = tokio::fs::remove_file(dest).await {
                warn!(path = %dest.display(), error = %e, "failed to remove partial file");
            }
        }
        stream_result
    }

    /// Sends a GET, retrying per the transport policy, and returns the first
    /// 2xx response or the terminal failure.
    async fn get_with_retry(&self, url: &str) -> Result<Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut retries_done: u32 = 0;
        loop {
            let decision = match self.client.get(parsed.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    match self.retry.decide_status(status.as_u16(), retries_done) {
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(status = status.as_u16(), reason, "not retrying");
                            return Err(DownloadError::http_status(url, status.as_u16()));
                        }
                        retry => retry,
                    }
                }
                Err(error) => match self.retry.decide_error(&error, retries_done) {
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(reason, "not retrying");
                        return Err(DownloadError::network(url, error));
                    }
                    retry => retry,
                },
            };

            if let RetryDecision::Retry { delay, attempt } = decision {
                debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "transport retry"
                );
                tokio::time::sleep(delay).await;
                retries_done += 1;
            }
        }
    }
}

async fn stream_to_file(
    file: &mut File,
    response: Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
