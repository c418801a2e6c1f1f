//! Parallel, all-or-nothing artifact downloads.

use futures::future::join_all;
use tracing::{debug, info};

use kiln::{CancelToken, Error, FetchFailure, Result};

/// Downloads remote artifacts over HTTP.
#[derive(Clone, Default)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
}

impl ArtifactFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, timeouts, headers).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch every URL concurrently and return the bodies in request order.
    ///
    /// All requests are allowed to settle. If any of them fails, the whole
    /// call fails with `Download` listing every failed URL and no buffer is
    /// returned. Cancellation drops the in-flight requests.
    ///
    /// # Errors
    /// Returns `Download` on any non-2xx status or network failure, and
    /// `Cancelled` if `cancel` fires first.
    pub async fn fetch_all<U: AsRef<str>>(
        &self,
        urls: &[U],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<u8>>> {
        cancel.check()?;
        let requests = urls.iter().map(|url| self.fetch_one(url.as_ref()));

        let settled = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            settled = join_all(requests) => settled,
        };

        let mut buffers = Vec::with_capacity(settled.len());
        let mut failures = Vec::new();
        for outcome in settled {
            match outcome {
                Ok(bytes) => buffers.push(bytes),
                Err(failure) => failures.push(failure),
            }
        }
        if !failures.is_empty() {
            return Err(Error::Download(failures));
        }

        let total: usize = buffers.iter().map(Vec::len).sum();
        info!(
            files = buffers.len(),
            mib = total / (1024 * 1024),
            "download complete"
        );
        Ok(buffers)
    }

    async fn fetch_one(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure> {
        debug!(url, "requesting artifact");
        let failure = |status: Option<u16>, reason: String| FetchFailure {
            url: url.to_string(),
            status,
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(
                Some(status.as_u16()),
                status
                    .canonical_reason()
                    .unwrap_or("unsuccessful status")
                    .to_string(),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| failure(Some(status.as_u16()), format!("reading body: {e}")))?;
        Ok(body.to_vec())
    }
}
