//! Bearer-token authentication middleware — spec §4.9 step 2, §7.
//!
//! Grounded on the teacher's `auth_middleware`/`AuthCheck`/
//! `AUTH_DISABLED_WARNED` shape (warn-once-if-disabled, constant-time
//! compare via an `Extension`-carried value), narrowed to a single
//! process-wide token instead of a per-path public-path allowlist: the only
//! bypass here is the health route, which axum routes around this layer
//! entirely rather than special-casing it inside the middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medrag_core::AuthToken;

use crate::ServerError;

pub async fn auth_middleware(
    State(token): State<Arc<AuthToken>>,
    request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(value) if value.starts_with("Bearer ") => {
            let presented = &value[7..];
            if token.matches(presented) {
                next.run(request).await
            } else {
                tracing::warn!("rejected request with invalid bearer token");
                server_error_response(ServerError::AuthInvalid)
            }
        }
        Some(_) => server_error_response(ServerError::AuthInvalid),
        None => server_error_response(ServerError::AuthMissing),
    }
}

fn server_error_response(err: ServerError) -> Response {
    let error_code = match &err {
        ServerError::AuthMissing => "MISSING_TOKEN",
        ServerError::AuthInvalid => "INVALID_TOKEN",
        _ => "INVALID_TOKEN",
    };
    let detail = err.to_string();
    let status: StatusCode = err.into();
    (status, Json(serde_json::json!({ "detail": detail, "error_code": error_code }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn token() -> Arc<AuthToken> {
        Arc::new(AuthToken::parse("a".repeat(64)).unwrap())
    }

    fn router() -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(token(), auth_middleware))
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let response = router()
            .oneshot(Request::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_token_passes() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header(header::AUTHORIZATION, format!("Bearer {}", "a".repeat(64)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
