use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifetime of an issued write credential, in seconds
pub const CREDENTIAL_TTL_SECS: u64 = 60;

/// Largest file the upload policy accepts by default (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types the upload policy accepts by default
pub const DEFAULT_ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

/// Response of the credential endpoint (`GET /url`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PresignedUrlResponse {
    /// Presigned URL authorizing a single PUT of one object
    pub url: String,
    /// ISO-8601 UTC timestamp when the presigned URL expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Upload policy advertised by the backend (`GET /config`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UploadConfigResponse {
    /// MIME types accepted for upload
    pub allowed_mime_types: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size_bytes: u64,
    /// Lifetime of an issued write credential
    pub credential_ttl_secs: u64,
}

impl Default for UploadConfigResponse {
    fn default() -> Self {
        Self {
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            credential_ttl_secs: CREDENTIAL_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Current version of the application
    pub semver: String,
    /// Commit hash of the current build (if available)
    pub rev: Option<String>,
}
