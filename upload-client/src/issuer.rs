use std::time::Duration;

use chrono::Utc;
use common_types::{PresignedUrlResponse, UploadConfigResponse, CREDENTIAL_TTL_SECS};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{credential::Credential, error::UploadError};

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Source of write credentials
#[async_trait::async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Obtains a fresh presigned write URL
    ///
    /// Every call yields a new object key; nothing is cached.
    async fn issue_write_credential(&self) -> Result<Credential, UploadError>;
}

/// Talks to the backend's `GET /url` and `GET /config` endpoints
pub struct HttpCredentialIssuer {
    base_url: Url,
    credential_ttl: Duration,
    http_client: ClientWithMiddleware,
}

impl HttpCredentialIssuer {
    /// Creates an issuer client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: Url) -> reqwest::Result<Self> {
        let reqwest_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;

        let http_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            base_url,
            credential_ttl: Duration::from_secs(CREDENTIAL_TTL_SECS),
            http_client,
        })
    }

    /// Sets the TTL attached to issued credentials
    #[must_use]
    pub const fn with_credential_ttl(mut self, credential_ttl: Duration) -> Self {
        self.credential_ttl = credential_ttl;
        self
    }

    /// Fetches the upload rules the backend advertises
    ///
    /// # Errors
    ///
    /// Returns `UploadError::IssuerUnavailable` if the request fails or the body is invalid
    pub async fn fetch_upload_config(&self) -> Result<UploadConfigResponse, UploadError> {
        self.get_json("config").await
    }

    fn endpoint(&self, path: &str) -> Result<Url, UploadError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                UploadError::IssuerUnavailable(format!("invalid issuer URL: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(path);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UploadError> {
        let url = self.endpoint(path)?;

        let response = self.http_client.get(url).send().await.map_err(|e| {
            warn!("Credential issuer request failed: {e}");
            UploadError::IssuerUnavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Credential issuer returned an error");
            return Err(UploadError::IssuerUnavailable(format!(
                "issuer responded with HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UploadError::IssuerUnavailable(format!("invalid issuer response: {e}")))
    }
}

#[async_trait::async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn issue_write_credential(&self) -> Result<Credential, UploadError> {
        let response: PresignedUrlResponse = self.get_json("url").await?;

        let write_url = Url::parse(&response.url).map_err(|e| {
            UploadError::IssuerUnavailable(format!("issuer returned an invalid URL: {e}"))
        })?;

        let credential = Credential::new(write_url, Utc::now(), self.credential_ttl);
        debug!(
            object_key = credential.object_key().unwrap_or_default(),
            "Write credential issued"
        );
        Ok(credential)
    }
}

/// Counting issuer for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use chrono::Utc;
    use url::Url;

    use super::{Credential, CredentialIssuer, UploadError};

    /// Issuer returning a distinct URL per call, or failing on demand
    pub struct MockCredentialIssuer {
        credential_ttl: Duration,
        calls: AtomicUsize,
        failing: AtomicBool,
        issued_age_secs: AtomicU64,
        issued: Mutex<Vec<Url>>,
    }

    impl Default for MockCredentialIssuer {
        fn default() -> Self {
            Self::new(Duration::from_secs(common_types::CREDENTIAL_TTL_SECS))
        }
    }

    impl MockCredentialIssuer {
        /// Creates a mock issuing credentials valid for `credential_ttl`
        #[must_use]
        pub const fn new(credential_ttl: Duration) -> Self {
            Self {
                credential_ttl,
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                issued_age_secs: AtomicU64::new(0),
                issued: Mutex::new(Vec::new()),
            }
        }

        /// Makes subsequent calls fail with `IssuerUnavailable`
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Backdates subsequent credentials by `age`
        pub fn set_issued_age(&self, age: Duration) {
            self.issued_age_secs.store(age.as_secs(), Ordering::SeqCst);
        }

        /// Number of issuance calls, failed ones included
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Write URLs handed out so far
        #[must_use]
        pub fn issued_urls(&self) -> Vec<Url> {
            self.issued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Most recently issued write URL
        #[must_use]
        pub fn last_issued(&self) -> Option<Url> {
            self.issued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl CredentialIssuer for MockCredentialIssuer {
        async fn issue_write_credential(&self) -> Result<Credential, UploadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

            if self.failing.load(Ordering::SeqCst) {
                return Err(UploadError::IssuerUnavailable(
                    "mock issuer is failing".to_string(),
                ));
            }

            let write_url = Url::parse(&format!(
                "https://uploads.s3.amazonaws.com/key-{call}?X-Amz-Expires=60&X-Amz-Signature=sig{call}"
            ))
            .map_err(|e| UploadError::IssuerUnavailable(e.to_string()))?;

            let age = i64::try_from(self.issued_age_secs.load(Ordering::SeqCst)).unwrap_or(0);
            let issued_at = Utc::now() - chrono::Duration::seconds(age);

            self.issued
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(write_url.clone());

            Ok(Credential::new(write_url, issued_at, self.credential_ttl))
        }
    }
}
