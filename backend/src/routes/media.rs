use std::sync::Arc;

use axum::{Extension, Json};
use common_types::PresignedUrlResponse;
use tracing::instrument;

use crate::{media_storage::MediaStorage, types::AppError};

/// Issues a presigned URL for uploading one object directly to S3
///
/// Every call generates a new random object key and signs a PUT for it. The
/// key is not recorded; expiry and single use are enforced by S3.
///
/// # Errors
///
/// Returns `503 issuer_unavailable` if the URL cannot be signed, and
/// `500 internal_error` if the presigning configuration is invalid.
#[instrument(skip(media_storage))]
pub async fn get_presigned_url(
    Extension(media_storage): Extension<Arc<MediaStorage>>,
) -> Result<Json<PresignedUrlResponse>, AppError> {
    let presigned_url = media_storage.issue_write_credential().await?;

    tracing::info!(
        object_key = %presigned_url.object_key,
        expires_at = %presigned_url.expires_at,
        "Issued presigned upload URL"
    );

    Ok(Json(PresignedUrlResponse {
        url: presigned_url.url,
        expires_at: Some(presigned_url.expires_at.to_rfc3339()),
    }))
}
