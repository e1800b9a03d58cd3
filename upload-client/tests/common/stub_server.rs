use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use common_types::{PresignedUrlResponse, UploadConfigResponse};
use tokio::net::TcpListener;
use url::Url;

/// Bucket name used in the stub's presigned URLs
pub const STUB_BUCKET: &str = "stub-bucket";

/// A PUT received by the stub storage endpoint
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub key: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Shared state of the stub issuer and storage
pub struct StubState {
    base_url: Url,
    url_calls: AtomicUsize,
    fail_issuance: AtomicBool,
    reject_uploads: AtomicBool,
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl StubState {
    pub fn set_fail_issuance(&self, fail: bool) {
        self.fail_issuance.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }

    pub fn url_calls(&self) -> usize {
        self.url_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

/// Local stand-in for both the credential issuer and the storage provider
pub struct StubServer {
    pub base_url: Url,
    pub state: Arc<StubState>,
}

impl StubServer {
    /// Binds an ephemeral port and serves `/url`, `/config`, `/broken/url` and `PUT /stub-bucket/{key}`
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = Url::parse(&format!("http://{addr}")).unwrap();

        let state = Arc::new(StubState {
            base_url: base_url.clone(),
            url_calls: AtomicUsize::new(0),
            fail_issuance: AtomicBool::new(false),
            reject_uploads: AtomicBool::new(false),
            uploads: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/url", get(issue_url))
            .route("/config", get(upload_config))
            .route("/broken/url", get(|| async { "not a credential" }))
            .route(&format!("/{STUB_BUCKET}/{{key}}"), put(store_object))
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }
}

async fn issue_url(State(state): State<Arc<StubState>>) -> Response {
    let call = state.url_calls.fetch_add(1, Ordering::SeqCst) + 1;

    if state.fail_issuance.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "issuer unavailable").into_response();
    }

    let url = format!(
        "{}{STUB_BUCKET}/key-{call}?X-Amz-Expires=60&X-Amz-Signature=sig{call}",
        state.base_url
    );

    Json(PresignedUrlResponse {
        url,
        expires_at: None,
    })
    .into_response()
}

async fn upload_config() -> Json<UploadConfigResponse> {
    Json(UploadConfigResponse::default())
}

async fn store_object(
    State(state): State<Arc<StubState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if state.reject_uploads.load(Ordering::SeqCst) {
        return StatusCode::FORBIDDEN;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    state.uploads.lock().unwrap().push(RecordedUpload {
        key,
        content_type,
        body: body.to_vec(),
    });

    StatusCode::OK
}
