//! S3-based presigned URL issuance
mod error;

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::{presigning::PresigningConfig, Client as S3Client};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;

pub use error::{BucketError, BucketResult};

/// Number of random bytes in a generated object key (128 bits)
const OBJECT_KEY_BYTES: usize = 16;

/// Presigned URL with expiration information
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The presigned URL for PUT operations
    pub url: String,
    /// Object key the URL is scoped to
    pub object_key: String,
    /// ISO-8601 UTC timestamp when the URL expires
    pub expires_at: DateTime<Utc>,
}

/// Issues presigned write URLs for a single bucket
///
/// Keeps no state between calls: keys are not recorded and consumption of a
/// URL is enforced by S3 alone.
pub struct MediaStorage {
    s3_client: Arc<S3Client>,
    bucket_name: String,
    presigned_url_expiry_secs: u64,
}

impl MediaStorage {
    /// Creates a new media storage client
    ///
    /// # Arguments
    ///
    /// * `s3_client` - Pre-configured S3 client
    /// * `bucket_name` - S3 bucket receiving uploads
    /// * `presigned_url_expiry_secs` - Lifetime of issued presigned URLs in seconds
    #[must_use]
    pub const fn new(
        s3_client: Arc<S3Client>,
        bucket_name: String,
        presigned_url_expiry_secs: u64,
    ) -> Self {
        Self {
            s3_client,
            bucket_name,
            presigned_url_expiry_secs,
        }
    }

    /// Lifetime of issued presigned URLs in seconds
    #[must_use]
    pub const fn presigned_url_expiry_secs(&self) -> u64 {
        self.presigned_url_expiry_secs
    }

    /// Generates a random object key: 16 bytes from the OS CSPRNG, lowercase hex
    #[must_use]
    pub fn generate_object_key() -> String {
        let mut bytes = [0u8; OBJECT_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Generates a presigned URL for a PUT of `object_key`
    ///
    /// # Errors
    ///
    /// Returns `BucketError::ConfigError` if presigning config creation fails
    /// Returns `BucketError::S3Error` if presigned URL generation fails
    pub async fn generate_presigned_put_url(&self, object_key: &str) -> BucketResult<PresignedUrl> {
        let presigned_config =
            PresigningConfig::expires_in(Duration::from_secs(self.presigned_url_expiry_secs))
                .map_err(|e| {
                    BucketError::ConfigError(format!("Failed to create presigning config: {e}"))
                })?;

        let presigned_url = self
            .s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(object_key)
            .presigned(presigned_config)
            .await?;

        let expires_at: DateTime<Utc> =
            Utc::now() + Duration::from_secs(self.presigned_url_expiry_secs);

        debug!(object_key, %expires_at, "Generated presigned PUT URL");

        Ok(PresignedUrl {
            url: presigned_url.uri().to_string(),
            object_key: object_key.to_string(),
            expires_at,
        })
    }

    /// Issues a write credential for a freshly generated object key
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::generate_presigned_put_url`]
    pub async fn issue_write_credential(&self) -> BucketResult<PresignedUrl> {
        let object_key = Self::generate_object_key();
        self.generate_presigned_put_url(&object_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_are_32_hex_chars_and_unique() {
        let first = MediaStorage::generate_object_key();
        let second = MediaStorage::generate_object_key();

        assert_eq!(first.len(), 32);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, second);
    }
}
