mod common;

use common::*;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use upload_client::{
    CandidateFile, Credential, CredentialIssuer, HttpCredentialIssuer, HttpTransferExecutor,
    ProgressReporter, TransferError, TransferExecutor, UploadError, UploadOutcome, UploadPolicy,
    UploadSession,
};
use url::Url;

fn issuer_for(server: &StubServer) -> HttpCredentialIssuer {
    HttpCredentialIssuer::new(server.base_url.clone()).expect("Failed to create issuer client")
}

async fn credential_from(server: &StubServer) -> Credential {
    issuer_for(server)
        .issue_write_credential()
        .await
        .expect("Failed to issue credential")
}

// Credential issuer

#[tokio::test]
async fn test_issuer_returns_presigned_url() {
    let server = StubServer::start().await;
    let before = Utc::now();

    let credential = credential_from(&server).await;

    let write_url = credential.write_url().as_str();
    assert!(write_url.starts_with(&format!("{}{STUB_BUCKET}/key-1", server.base_url)));
    assert!(credential.write_url().query().unwrap().contains("X-Amz-Signature"));
    assert_eq!(credential.object_key(), Some("key-1"));
    assert_eq!(credential.ttl(), Duration::from_secs(60));
    assert!(credential.issued_at() >= before);
    assert!(!credential.is_expired());
    assert_eq!(server.state.url_calls(), 1);
}

#[tokio::test]
async fn test_issuer_uses_configured_ttl() {
    let server = StubServer::start().await;

    let credential = issuer_for(&server)
        .with_credential_ttl(Duration::from_secs(5))
        .issue_write_credential()
        .await
        .unwrap();

    assert_eq!(credential.ttl(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_issuer_error_status_is_unavailable() {
    let server = StubServer::start().await;
    server.state.set_fail_issuance(true);

    let result = issuer_for(&server).issue_write_credential().await;

    assert!(matches!(result, Err(UploadError::IssuerUnavailable(_))));
}

#[tokio::test]
async fn test_unreachable_issuer_is_unavailable() {
    // Reserve a port, then free it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let issuer = HttpCredentialIssuer::new(Url::parse(&format!("http://{addr}")).unwrap()).unwrap();
    let result = issuer.issue_write_credential().await;

    assert!(matches!(result, Err(UploadError::IssuerUnavailable(_))));
}

#[tokio::test]
async fn test_issuer_rejects_unexpected_body() {
    let server = StubServer::start().await;

    let issuer = HttpCredentialIssuer::new(server.base_url.join("broken/").unwrap()).unwrap();
    let result = issuer.issue_write_credential().await;

    assert!(matches!(result, Err(UploadError::IssuerUnavailable(_))));
}

#[tokio::test]
async fn test_fetch_upload_config() {
    let server = StubServer::start().await;

    let config = issuer_for(&server).fetch_upload_config().await.unwrap();
    let policy = UploadPolicy::from(config);

    assert_eq!(policy, UploadPolicy::default());
    assert!(policy.allows_mime_type("image/png"));
    assert_eq!(policy.credential_ttl(), Duration::from_secs(60));
}

// Transfer executor

#[tokio::test]
async fn test_transfer_puts_file_with_content_type() {
    let server = StubServer::start().await;
    let credential = credential_from(&server).await;
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let file = CandidateFile::from_bytes("photo.png", "image/png", content.clone());
    let (reporter, seen) = recording_reporter();

    let retrieval_url = HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &file, reporter)
        .await
        .unwrap();

    assert_eq!(retrieval_url, credential.retrieval_url().to_string());
    assert!(!retrieval_url.contains('?'));

    let uploads = server.state.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].key, "key-1");
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(uploads[0].body, content);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert_non_decreasing(&seen);
}

#[tokio::test]
async fn test_transfer_streams_file_from_disk() {
    let server = StubServer::start().await;
    let credential = credential_from(&server).await;

    let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    let content = vec![b'%'; 150_000];
    tmp.write_all(&content).unwrap();
    tmp.flush().unwrap();

    let file = CandidateFile::from_path(tmp.path(), "application/pdf")
        .await
        .unwrap();

    HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &file, ProgressReporter::noop())
        .await
        .unwrap();

    let uploads = server.state.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content_type.as_deref(), Some("application/pdf"));
    assert_eq!(uploads[0].body, content);
}

#[tokio::test]
async fn test_empty_file_reports_complete() {
    let server = StubServer::start().await;
    let credential = credential_from(&server).await;
    let file = CandidateFile::from_bytes("empty.png", "image/png", Vec::new());
    let (reporter, seen) = recording_reporter();

    HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &file, reporter)
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().last(), Some(&100));
    assert!(server.state.uploads()[0].body.is_empty());
}

#[tokio::test]
async fn test_rejected_put_is_http_status_error() {
    let server = StubServer::start().await;
    server.state.set_reject_uploads(true);
    let credential = credential_from(&server).await;

    let result = HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &png(1024), ProgressReporter::noop())
        .await;

    assert_eq!(result, Err(TransferError::HttpStatus(403)));
    assert!(server.state.uploads().is_empty());
}

#[tokio::test]
async fn test_unreachable_storage_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let credential = Credential::new(
        Url::parse(&format!("http://{addr}/{STUB_BUCKET}/key-1?X-Amz-Signature=sig")).unwrap(),
        Utc::now(),
        Duration::from_secs(60),
    );

    let result = HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &png(1024), ProgressReporter::noop())
        .await;

    let Err(TransferError::Network(message)) = result else {
        panic!("expected a network error, got {result:?}");
    };
    assert!(!message.contains("X-Amz-Signature"));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let server = StubServer::start().await;
    let credential = credential_from(&server).await;

    let tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    let file = CandidateFile::from_path(tmp.path(), "image/png").await.unwrap();
    drop(tmp);

    let result = HttpTransferExecutor::new()
        .unwrap()
        .transfer(&credential, &file, ProgressReporter::noop())
        .await;

    assert!(matches!(result, Err(TransferError::Io(_))));
    assert!(server.state.uploads().is_empty());
}

// Whole workflow over HTTP

fn http_session(server: &StubServer) -> UploadSession {
    UploadSession::new(
        Arc::new(issuer_for(server)),
        Arc::new(HttpTransferExecutor::new().unwrap()),
        UploadPolicy::default(),
    )
}

#[tokio::test]
async fn test_session_uploads_over_http() {
    let server = StubServer::start().await;
    let mut session = http_session(&server);

    session.issue_credential().await.unwrap();
    session.select(png(300_000)).unwrap();
    session.start().await.unwrap();

    let outcome = wait_for_outcome(&mut session).await;

    let expected = format!("{}{STUB_BUCKET}/key-1", server.base_url);
    assert_eq!(
        outcome,
        UploadOutcome::Succeeded {
            retrieval_url: expected
        }
    );
    assert_eq!(server.state.url_calls(), 1);
    assert_eq!(server.state.uploads()[0].body.len(), 300_000);
}

#[tokio::test]
async fn test_session_recovers_after_rejected_upload() {
    let server = StubServer::start().await;
    let mut session = http_session(&server);

    session.issue_credential().await.unwrap();
    server.state.set_reject_uploads(true);
    session.select(png(1024)).unwrap();
    session.start().await.unwrap();

    assert_eq!(
        wait_for_outcome(&mut session).await,
        UploadOutcome::Failed {
            reason: UploadError::Transfer(TransferError::HttpStatus(403)),
        }
    );

    session.remove().await.unwrap();
    assert_eq!(session.credential().unwrap().object_key(), Some("key-2"));

    server.state.set_reject_uploads(false);
    session.select(png(1024)).unwrap();
    session.start().await.unwrap();

    assert!(matches!(
        wait_for_outcome(&mut session).await,
        UploadOutcome::Succeeded { .. }
    ));
    assert_eq!(server.state.uploads()[0].key, "key-2");
    assert_eq!(server.state.url_calls(), 2);
}
