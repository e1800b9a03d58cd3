use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Body, Client,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use tracing::{debug, info, warn};

use crate::{credential::Credential, error::TransferError, file::CandidateFile};

/// Connect timeout for storage requests; the transfer itself is not bounded
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Marker for "nothing reported yet"
const NOT_REPORTED: u16 = u16::MAX;

/// Percentage of `sent` out of `total`, rounded half up; empty files are complete
#[must_use]
pub fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }

    let sent = u128::from(sent.min(total));
    let total = u128::from(total);
    let rounded = (sent * 200 + total) / (total * 2);
    u8::try_from(rounded).unwrap_or(100)
}

/// Forwards upload progress to a callback, dropping anything that is not an increase
///
/// Clones share the last reported value, so the sequence seen by the
/// callback is strictly increasing within `0..=100` however the clones are used.
#[derive(Clone)]
pub struct ProgressReporter {
    last: Arc<AtomicU16>,
    callback: Arc<dyn Fn(u8) + Send + Sync>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Creates a reporter invoking `callback` with each new percentage
    pub fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            last: Arc::new(AtomicU16::new(NOT_REPORTED)),
            callback: Arc::new(callback),
        }
    }

    /// Reporter that discards progress
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Reports a percentage, clamped to 100
    pub fn report(&self, percent: u8) {
        let percent = u16::from(percent.min(100));
        let advanced = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                (last == NOT_REPORTED || percent > last).then_some(percent)
            })
            .is_ok();

        if advanced {
            // Lossless: clamped to 100 above
            (self.callback)(u8::try_from(percent).unwrap_or(100));
        }
    }

    /// Reports progress as bytes sent out of a total
    pub fn report_bytes(&self, sent: u64, total: u64) {
        self.report(progress_percent(sent, total));
    }
}

/// Performs the single PUT of a file against a presigned URL
#[async_trait::async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Uploads the whole file to `credential`'s write URL and returns the retrieval URL
    ///
    /// No retries: any failure ends the attempt, and the credential must not
    /// be used again.
    async fn transfer(
        &self,
        credential: &Credential,
        file: &CandidateFile,
        progress: ProgressReporter,
    ) -> Result<String, TransferError>;
}

/// Streams files to S3 presigned URLs over HTTP
pub struct HttpTransferExecutor {
    http_client: ClientWithMiddleware,
}

impl HttpTransferExecutor {
    /// Creates an executor with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new() -> reqwest::Result<Self> {
        let reqwest_client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(
            ClientBuilder::new(reqwest_client)
                .with(TracingMiddleware::default())
                .build(),
        ))
    }

    /// Creates an executor using an existing HTTP client
    #[must_use]
    pub const fn with_client(http_client: ClientWithMiddleware) -> Self {
        Self { http_client }
    }
}

#[async_trait::async_trait]
impl TransferExecutor for HttpTransferExecutor {
    async fn transfer(
        &self,
        credential: &Credential,
        file: &CandidateFile,
        progress: ProgressReporter,
    ) -> Result<String, TransferError> {
        let total = file.size_bytes();
        let chunks = file
            .open_stream()
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        progress.report(0);

        let reporter = progress.clone();
        let mut sent: u64 = 0;
        let counted = chunks.inspect_ok(move |chunk| {
            sent = sent.saturating_add(chunk.len() as u64);
            reporter.report_bytes(sent, total);
        });

        debug!(
            object_key = credential.object_key().unwrap_or_default(),
            size_bytes = total,
            mime_type = file.mime_type(),
            "Starting transfer"
        );

        let response = self
            .http_client
            .put(credential.write_url().as_str())
            .header(CONTENT_TYPE, file.mime_type())
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(counted))
            .send()
            .await
            .map_err(|e| {
                let message = redacted_message(e);
                warn!("Transfer failed before a response was received: {message}");
                TransferError::Network(message)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Storage provider rejected the upload");
            return Err(TransferError::HttpStatus(status.as_u16()));
        }

        progress.report(100);

        let retrieval_url = credential.retrieval_url().to_string();
        info!(%retrieval_url, "Transfer completed");
        Ok(retrieval_url)
    }
}

/// Error text without the request URL, whose query carries the signature
fn redacted_message(error: reqwest_middleware::Error) -> String {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.without_url().to_string(),
        reqwest_middleware::Error::Middleware(e) => e.to_string(),
    }
}

/// Scripted executor for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{ProgressReporter, TransferError, TransferExecutor};
    use crate::{credential::Credential, file::CandidateFile};

    /// Scripted result of a mock transfer
    #[derive(Debug, Clone)]
    pub enum MockTransferBehavior {
        /// Report `progress` then succeed
        Succeed {
            /// Percentages reported before completing
            progress: Vec<u8>,
        },
        /// Report `progress` then fail with `error`
        Fail {
            /// Percentages reported before failing
            progress: Vec<u8>,
            /// Error returned
            error: TransferError,
        },
        /// Never complete; only cancellation ends the transfer
        Hang,
    }

    /// Transfer executor that follows a script and counts invocations
    pub struct MockTransferExecutor {
        behavior: MockTransferBehavior,
        calls: AtomicUsize,
    }

    impl MockTransferExecutor {
        /// Creates a mock following `behavior` on every call
        #[must_use]
        pub const fn new(behavior: MockTransferBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        /// Number of transfers started
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TransferExecutor for MockTransferExecutor {
        async fn transfer(
            &self,
            credential: &Credential,
            _file: &CandidateFile,
            progress: ProgressReporter,
        ) -> Result<String, TransferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let report_all = |steps: &[u8]| {
                for percent in steps {
                    progress.report(*percent);
                }
            };

            match &self.behavior {
                MockTransferBehavior::Succeed { progress: steps } => {
                    report_all(steps);
                    tokio::task::yield_now().await;
                    Ok(credential.retrieval_url().to_string())
                }
                MockTransferBehavior::Fail {
                    progress: steps,
                    error,
                } => {
                    report_all(steps);
                    tokio::task::yield_now().await;
                    Err(error.clone())
                }
                MockTransferBehavior::Hang => std::future::pending().await,
            }
        }
    }
}
