// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! JSON body parsing stage

use std::error::Error as _;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, header::CONTENT_LENGTH, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::Value;
use tracing::{debug, info};

use super::{PipelineStage, StageProbe};
use crate::error::RequestError;

/// Largest accepted request body, in bytes
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Parsed JSON request body
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

/// State for the body stage
#[derive(Debug, Clone)]
pub struct BodyStage {
    pub(super) limit: usize,
    pub(super) probe: Option<StageProbe>,
}

impl BodyStage {
    /// Ceiling applied by this stage
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Whether the request declares a JSON media type
pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|media_type| {
            let media_type = media_type.trim().to_ascii_lowercase();
            media_type == "application/json" || media_type.ends_with("+json")
        })
        .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, RequestError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let mut source = e.source();
        while let Some(cause) = source {
            if cause.is::<LengthLimitError>() {
                return RequestError::PayloadTooLarge { limit };
            }
            source = cause.source();
        }
        RequestError::bad_request(format!("failed to read request body: {e}"))
    })
}

/// Buffer and parse JSON bodies up to the configured ceiling
///
/// Non-JSON requests pass through untouched. JSON requests are rejected with
/// `413` when they exceed the ceiling and `400` when they do not parse. On
/// success the parsed value is inserted as [`ParsedBody`] and the raw bytes
/// become the body again.
pub async fn parse_json_body(State(stage): State<BodyStage>, req: Request, next: Next) -> Response {
    super::enter(stage.probe.as_ref(), PipelineStage::Body);

    if !is_json(req.headers()) {
        return next.run(req).await;
    }

    if let Some(length) = declared_length(req.headers())
        && length > stage.limit
    {
        info!(length, limit = stage.limit, "rejecting oversized request body");
        return RequestError::PayloadTooLarge { limit: stage.limit }.into_response();
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match read_limited(body, stage.limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            info!(error = %e, "request body rejected");
            return e.into_response();
        }
    };

    if !bytes.is_empty() {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                debug!(bytes = bytes.len(), "parsed JSON request body");
                parts.extensions.insert(ParsedBody(value));
            }
            Err(e) => {
                debug!(error = %e, "malformed JSON request body");
                return RequestError::bad_request(format!("malformed JSON body: {e}"))
                    .into_response();
            }
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, middleware::from_fn_with_state, routing::post};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn app(limit: usize) -> Router {
        Router::new()
            .route(
                "/",
                post(|req: Request| async move {
                    match req.extensions().get::<ParsedBody>() {
                        Some(ParsedBody(value)) => value.to_string(),
                        None => "unparsed".to_string(),
                    }
                }),
            )
            .layer(from_fn_with_state(BodyStage { limit, probe: None }, parse_json_body))
    }

    fn json_request(body: impl Into<Body>) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn valid_json_is_parsed() {
        let response = app(1024)
            .oneshot(json_request(r#"{"query":"{ __typename }"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(echoed, json!({"query": "{ __typename }"}));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let response = app(1024).oneshot(json_request("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error["error"], "bad_request");
    }

    #[tokio::test]
    async fn declared_oversize_is_rejected_early() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, "2048")
            .body(Body::from(vec![b'a'; 2048]))
            .unwrap();
        let response = app(1024).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn declared_oversize_non_json_passes_through() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_LENGTH, "1025")
            .body(Body::from(vec![b'a'; 1025]))
            .unwrap();
        let response = app(1024).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "unparsed");
    }

    #[tokio::test]
    async fn undeclared_oversize_is_rejected() {
        let response = app(1024)
            .oneshot(json_request(vec![b' '; 2048]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let error: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(error["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn non_json_passes_through() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = app(1024).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "unparsed");
    }

    #[test]
    fn json_media_types() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, "application/graphql-response+json".parse().unwrap());
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, "text/html".parse().unwrap());
        assert!(!is_json(&headers));
    }

    #[test]
    fn limit_is_ten_mebibytes() {
        assert_eq!(BODY_LIMIT_BYTES, 10_485_760);
    }
}
