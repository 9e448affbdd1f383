//! Shared-key authentication for the protected routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Header carrying the shared key. Header names are case-insensitive.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-API-KEY` header is absent or does not match
/// `expected`.
pub(crate) async fn require_api_key(State(expected): State<Arc<str>>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .is_some_and(|provided| constant_time_eq(provided.as_bytes(), expected.as_bytes()));

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without a valid API key");
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// Compare two byte strings in time independent of where they differ.
///
/// Length is not hidden.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use proptest::prelude::*;
    use tower::ServiceExt;

    fn app(key: &str) -> Router {
        Router::new()
            .route("/secret", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(Arc::<str>::from(key), require_api_key))
    }

    async fn call(app: Router, key: Option<&str>) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri("/secret");
        if let Some(key) = key {
            request = request.header("X-API-KEY", key);
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let (status, body) = call(app("s3cret"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized");
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let (status, _) = call(app("s3cret"), Some("s3cre")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app("s3cret"), Some("")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_matching_key_passes_through() {
        let (status, body) = call(app("s3cret"), Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn test_constant_time_eq_basics() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    proptest! {
        #[test]
        fn constant_time_eq_matches_slice_eq(a in proptest::collection::vec(any::<u8>(), 0..32),
                                             b in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assert_eq!(constant_time_eq(&a, &b), a == b);
            prop_assert!(constant_time_eq(&a, &a));
        }
    }
}
