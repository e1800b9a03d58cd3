use std::collections::BTreeSet;
use std::time::Duration;

use common_types::{
    UploadConfigResponse, CREDENTIAL_TTL_SECS, DEFAULT_ALLOWED_MIME_TYPES,
    DEFAULT_MAX_FILE_SIZE_BYTES,
};
use mime::Mime;

use crate::{error::InvalidFileReason, file::CandidateFile};

/// Rules a file must satisfy before it may be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    allowed_mime_types: BTreeSet<String>,
    max_file_size_bytes: u64,
    credential_ttl: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_MIME_TYPES,
            DEFAULT_MAX_FILE_SIZE_BYTES,
            Duration::from_secs(CREDENTIAL_TTL_SECS),
        )
    }
}

impl From<UploadConfigResponse> for UploadPolicy {
    fn from(config: UploadConfigResponse) -> Self {
        Self::new(
            config.allowed_mime_types,
            config.max_file_size_bytes,
            Duration::from_secs(config.credential_ttl_secs),
        )
    }
}

impl UploadPolicy {
    /// Creates a policy; MIME types are compared by lowercase essence
    pub fn new<S: AsRef<str>>(
        allowed_mime_types: impl IntoIterator<Item = S>,
        max_file_size_bytes: u64,
        credential_ttl: Duration,
    ) -> Self {
        Self {
            allowed_mime_types: allowed_mime_types
                .into_iter()
                .filter_map(|mime_type| essence(mime_type.as_ref()))
                .collect(),
            max_file_size_bytes,
            credential_ttl,
        }
    }

    /// Replaces the maximum file size
    #[must_use]
    pub const fn with_max_file_size_bytes(mut self, max_file_size_bytes: u64) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self
    }

    /// Replaces the credential lifetime
    #[must_use]
    pub const fn with_credential_ttl(mut self, credential_ttl: Duration) -> Self {
        self.credential_ttl = credential_ttl;
        self
    }

    /// Accepted MIME types
    #[must_use]
    pub const fn allowed_mime_types(&self) -> &BTreeSet<String> {
        &self.allowed_mime_types
    }

    /// Maximum accepted size in bytes
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// Lifetime of an issued credential
    #[must_use]
    pub const fn credential_ttl(&self) -> Duration {
        self.credential_ttl
    }

    /// Whether `mime_type` is accepted; parameters such as `charset` are ignored
    #[must_use]
    pub fn allows_mime_type(&self, mime_type: &str) -> bool {
        essence(mime_type).is_some_and(|essence| self.allowed_mime_types.contains(&essence))
    }

    /// Checks type first, then size
    ///
    /// # Errors
    ///
    /// Returns `InvalidFileReason::UnsupportedType` or `InvalidFileReason::TooLarge`
    pub fn validate(&self, file: &CandidateFile) -> Result<(), InvalidFileReason> {
        if !self.allows_mime_type(file.mime_type()) {
            return Err(InvalidFileReason::UnsupportedType);
        }

        if file.size_bytes() > self.max_file_size_bytes {
            return Err(InvalidFileReason::TooLarge);
        }

        Ok(())
    }
}

fn essence(mime_type: &str) -> Option<String> {
    mime_type
        .trim()
        .parse::<Mime>()
        .ok()
        .map(|mime| mime.essence_str().to_lowercase())
}
