//! Credential issuer service for presigned uploads

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

/// Presigned URL issuance against S3
pub mod media_storage;

/// HTTP routes
pub mod routes;

/// HTTP server setup
pub mod server;

/// Configuration and error types
pub mod types;
