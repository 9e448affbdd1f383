//! HTTP surface of the [`Server`].

use super::Server;
use super::auth::require_api_key;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

impl Server {
    /// Build the HTTP router.
    ///
    /// `/health` and `/ready` are always public. `/status` and
    /// `/{repository}` require the API key when one is configured. Methods
    /// other than `GET` and `HEAD` get `405 Method Not Allowed`.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let protected = Router::new()
            .route("/status", get(status))
            .route("/{name}", get(repository_data));
        let protected = match &self.inner.auth_key {
            Some(key) => protected.route_layer(middleware::from_fn_with_state(key.clone(), require_api_key)),
            None => protected,
        };

        Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .merge(protected)
            .with_state(self.clone())
            .layer(TimeoutLayer::new(self.inner.request_timeout))
            .layer(TraceLayer::new_for_http())
    }
}

async fn health(State(server): State<Server>) -> Response {
    let (code, label) = if server.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    let body = json!({
        "status": label,
        "repositories": server.repository_status(),
    });
    (code, Json(body)).into_response()
}

async fn ready(State(server): State<Server>) -> Response {
    if server.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not ready" }))).into_response()
    }
}

async fn status(State(server): State<Server>) -> Response {
    Json(json!({
        "healthy": server.is_healthy(),
        "ready": server.is_ready(),
        "repositories": server.repository_status(),
    }))
    .into_response()
}

async fn repository_data(State(server): State<Server>, Path(name): Path<String>) -> Response {
    match server.repository(&name) {
        Some(repository) => (
            [(header::CONTENT_TYPE, "application/yaml")],
            repository.get_raw_data(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "repository not found").into_response(),
    }
}
