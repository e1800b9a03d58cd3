use axum::{Extension, Json};
use common_types::UploadConfigResponse;

use crate::types::Environment;

/// Upload policy clients should enforce before requesting a transfer
#[allow(clippy::unused_async)]
pub async fn get_config(
    Extension(environment): Extension<Environment>,
) -> Json<UploadConfigResponse> {
    Json(environment.upload_config())
}
