//! Client side of the presigned upload workflow
//!
//! An [`UploadSession`] owns one candidate file and one write credential. It
//! obtains credentials from a [`CredentialIssuer`], hands the file to a
//! [`TransferExecutor`] for a single PUT against the presigned URL, and
//! exposes the resulting [`UploadOutcome`] to whatever renders it.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

/// Write credentials issued by the backend
pub mod credential;

/// Error taxonomy of an upload attempt
pub mod error;

/// Files selected for upload
pub mod file;

/// Credential issuer clients
pub mod issuer;

/// Local validation rules
pub mod policy;

/// Upload session state machine
pub mod session;

/// Direct-to-storage transfers
pub mod transfer;

pub use credential::Credential;
pub use error::{InvalidFileReason, TransferError, UploadError, UploadResult};
pub use file::{CandidateFile, FileContent, FileInfo};
pub use issuer::{CredentialIssuer, HttpCredentialIssuer};
pub use policy::UploadPolicy;
pub use session::{AttemptEvent, AttemptId, TransferEvent, UploadOutcome, UploadSession};
pub use transfer::{HttpTransferExecutor, ProgressReporter, TransferExecutor};
