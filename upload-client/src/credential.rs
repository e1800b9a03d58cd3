use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

/// A presigned write URL together with the time it was obtained
///
/// The URL authorizes one PUT of one object key. S3 enforces expiry and
/// single use; locally the credential is only ever handed to one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    write_url: Url,
    issued_at: DateTime<Utc>,
    ttl: Duration,
}

impl Credential {
    /// Creates a credential issued at `issued_at` and valid for `ttl`
    #[must_use]
    pub const fn new(write_url: Url, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            write_url,
            issued_at,
            ttl,
        }
    }

    /// Signed URL the file is PUT to
    #[must_use]
    pub const fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Write URL without its query (signature) and fragment
    #[must_use]
    pub fn retrieval_url(&self) -> Url {
        let mut url = self.write_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Object key the URL is scoped to, taken from the last path segment
    #[must_use]
    pub fn object_key(&self) -> Option<&str> {
        self.write_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
    }

    /// When the credential was received
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// How long the credential is honoured after issuance
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Age of the credential at `now`; zero if `now` precedes issuance
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.issued_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// A credential is expired once its age reaches the TTL
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) >= self.ttl
    }

    /// Whether the credential is expired right now
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
