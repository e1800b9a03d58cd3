use std::sync::Arc;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;
use axum::{body::Body, http::Request, response::Response, Router};
use tower::ServiceExt;
use upload_backend::{media_storage::MediaStorage, server, types::Environment};

pub const TEST_BUCKET: &str = "presigned-uploads-test";

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    dotenvy::from_path(".env.example").ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

/// S3 client pointed at LocalStack with static credentials
///
/// Presigning is computed locally, so no S3 endpoint needs to be reachable.
pub fn s3_client_with_static_credentials() -> S3Client {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "static"))
        .endpoint_url("http://localhost:4566")
        .force_path_style(true)
        .build();

    S3Client::from_conf(config)
}

/// Base test setup with core dependencies
pub struct TestSetup {
    pub router: Router,
    pub environment: Environment,
    pub media_storage: Arc<MediaStorage>,
}

impl TestSetup {
    pub fn new(environment: Environment) -> Self {
        setup_test_env();

        let s3_client = s3_client_with_static_credentials();

        let media_storage = Arc::new(MediaStorage::new(
            Arc::new(s3_client),
            TEST_BUCKET.to_string(),
            environment.presigned_url_expiry_secs(),
        ));

        let router = server::router(environment.clone(), media_storage.clone());

        Self {
            router,
            environment,
            media_storage,
        }
    }

    pub fn development() -> Self {
        Self::new(Environment::Development {
            presign_expiry_override: None,
        })
    }

    pub async fn send_get_request(
        &self,
        route: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("GET")
            .body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }
}
