//! Caller identity extractor.

use crate::errors::AppError;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const CALLER_ID_HEADER: &str = "x-user-id";

/// The id of the user on whose behalf the request runs.
///
/// Rejects with 401 when the header is absent, blank, or not valid UTF-8.
///
/// ```ignore
/// async fn search(CallerId(user_id): CallerId) -> String {
///     format!("searching for {user_id}")
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CallerId(value.to_string()))
            .ok_or_else(|| {
                AppError::Unauthorized(format!("Missing {} header", CALLER_ID_HEADER))
                    .into_response()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new().route("/", get(|CallerId(id): CallerId| async move { id }))
    }

    #[tokio::test]
    async fn test_extracts_trimmed_header() {
        let request = Request::get("/")
            .header(CALLER_ID_HEADER, " user-42 ")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"user-42");
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let request = Request::get("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_blank_header_is_unauthorized() {
        let request = Request::get("/")
            .header(CALLER_ID_HEADER, "   ")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
