//! HTTP response handling
//!
//! Error bodies are pre-serialized once and reused. Every failure that follows
//! a readable request body shares the same generic server error, so callers
//! cannot tell verification failures from directory failures.

use actix_web::{http::header, HttpResponse, HttpResponseBuilder};
use serde::Serialize;
use serde_json::json;

// ===============================
// CACHED RESPONSES
// ===============================

static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

struct CachedResponses {
    invalid_request: String,
    missing_payload: String,
    missing_events: String,
    server_error: String,
    method_not_allowed: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            invalid_request: Self::create_json(
                "invalid_request",
                "The request body is not valid JSON",
            ),
            missing_payload: Self::create_json(
                "invalid_request",
                "The request body must contain a non-empty 'payload'",
            ),
            missing_events: Self::create_json(
                "invalid_request",
                "The notification does not contain any events",
            ),
            server_error: Self::create_json("server_error", "An internal server error occurred"),
            method_not_allowed: Self::create_json(
                "method_not_allowed",
                "Only POST is supported on this endpoint",
            ),
        }
    }

    fn create_json(error: &str, description: &str) -> String {
        json!({
            "error": error,
            "error_description": description
        })
        .to_string()
    }

    fn respond(mut builder: HttpResponseBuilder, body: &str) -> HttpResponse {
        builder
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body.to_owned())
    }
}

/// Unified response builder for the notification endpoint
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// 400 for a body that is not JSON
    #[must_use]
    pub fn invalid_request() -> HttpResponse {
        CachedResponses::respond(
            HttpResponse::BadRequest(),
            &CACHED_RESPONSES.invalid_request,
        )
    }

    /// 400 for a body without a usable `payload`
    #[must_use]
    pub fn missing_payload() -> HttpResponse {
        CachedResponses::respond(
            HttpResponse::BadRequest(),
            &CACHED_RESPONSES.missing_payload,
        )
    }

    /// 400 for a verified token with no `events` claim
    #[must_use]
    pub fn missing_events() -> HttpResponse {
        CachedResponses::respond(
            HttpResponse::BadRequest(),
            &CACHED_RESPONSES.missing_events,
        )
    }

    /// Generic 500 shared by every processing failure
    #[must_use]
    pub fn server_error() -> HttpResponse {
        CachedResponses::respond(
            HttpResponse::InternalServerError(),
            &CACHED_RESPONSES.server_error,
        )
    }

    /// 405 advertising the methods the resource accepts
    #[must_use]
    pub fn method_not_allowed(allowed: &'static str) -> HttpResponse {
        let mut builder = HttpResponse::MethodNotAllowed();
        builder.insert_header((header::ALLOW, allowed));
        CachedResponses::respond(builder, &CACHED_RESPONSES.method_not_allowed)
    }

    /// 200 with a JSON body
    #[must_use]
    pub fn ok<T: Serialize>(body: &T) -> HttpResponse {
        HttpResponse::Ok().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_server_error_is_generic() {
        let response = ResponseBuilder::server_error();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "server_error");
    }

    #[actix_web::test]
    async fn test_method_not_allowed_sets_allow_header() {
        let response = ResponseBuilder::method_not_allowed("POST");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST");
    }

    #[actix_web::test]
    async fn test_bad_request_variants() {
        for response in [
            ResponseBuilder::invalid_request(),
            ResponseBuilder::missing_payload(),
            ResponseBuilder::missing_events(),
        ] {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "invalid_request");
        }
    }
}
