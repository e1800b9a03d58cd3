use thiserror::Error;

/// Result type for upload session operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Why a file was rejected before any network access
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFileReason {
    /// MIME type is not in the allowed set
    #[error("unsupported file type")]
    UnsupportedType,

    /// File is larger than the configured maximum
    #[error("file exceeds the maximum upload size")]
    TooLarge,
}

/// Failure of a single PUT against a presigned URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Storage provider answered with a non-2xx status
    #[error("storage provider rejected the upload with HTTP {0}")]
    HttpStatus(u16),

    /// Connection failed or broke mid-transfer
    #[error("network error: {0}")]
    Network(String),

    /// Local file content could not be opened
    #[error("failed to read file content: {0}")]
    Io(String),

    /// Transfer was aborted by the session
    #[error("transfer cancelled")]
    Cancelled,
}

/// Errors surfaced by an upload session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Local validation failed; the session did not change state
    #[error("invalid file: {0}")]
    InvalidFile(#[from] InvalidFileReason),

    /// Credential endpoint unreachable or errored
    #[error("credential issuer unavailable: {0}")]
    IssuerUnavailable(String),

    /// Held credential expired and could not be re-issued
    #[error("upload credential expired and re-issuance failed: {0}")]
    CredentialExpired(String),

    /// PUT against the presigned URL failed
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// `start` was called without a selected file
    #[error("no file selected")]
    NoFileSelected,

    /// Operation is not allowed while a transfer is running
    #[error("an upload is in progress")]
    UploadInProgress,

    /// Attempt reached a terminal state and must be removed first
    #[error("upload attempt already finished")]
    AttemptFinished,
}
