use axum::response::Response;
use http_body_util::BodyExt;
use url::Url;

/// Parse response body to JSON
pub async fn parse_response_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Object key addressed by a path-style presigned URL
pub fn object_key_from_url(url: &str) -> String {
    let parsed = Url::parse(url).expect("presigned URL must be valid");
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string()
}

/// Value of a query parameter of a presigned URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).expect("presigned URL must be valid");
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
