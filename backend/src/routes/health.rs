use aide::axum::IntoApiResponse;
use axum::Json;
use common_types::HealthResponse;

/// Health check endpoint
///
/// Returns the current status and version information of the service.
#[allow(clippy::unused_async)]
pub async fn handler() -> impl IntoApiResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        semver: env!("CARGO_PKG_VERSION").to_string(),
        rev: option_env!("GIT_REV").map(ToString::to_string),
    })
}

/// Liveness string served on the root path
#[allow(clippy::unused_async)]
pub async fn status() -> Json<String> {
    Json("Server is up and running..".to_string())
}
