mod config;
mod docs;
mod health;
mod media;

use aide::axum::{routing::get, ApiRouter};

/// Creates the router with all handler routes
pub fn handler() -> ApiRouter {
    ApiRouter::new()
        .merge(docs::handler())
        .api_route("/", get(health::status))
        .api_route("/health", get(health::handler))
        .api_route("/url", get(media::get_presigned_url))
        .api_route("/config", get(config::get_config))
}
