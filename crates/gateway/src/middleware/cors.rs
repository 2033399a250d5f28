// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! CORS stage
//!
//! Requests carrying an `Origin` outside the allowed set are denied with `403`.
//! Allowed requests get credentialed CORS headers from `tower-http`'s
//! [`CorsLayer`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::ORIGIN},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, info};

use super::{PipelineStage, StageProbe};
use crate::{config::AppConfig, error::RequestError};

/// Origin of the hosted GraphQL development tooling, allowed in development mode
pub const DEV_TOOLING_ORIGIN: &str = "https://studio.apollographql.com";

/// Origins allowed for a configuration
///
/// Development mode adds [`DEV_TOOLING_ORIGIN`] to the configured client origin.
pub fn allowed_origins(config: &AppConfig) -> Vec<String> {
    let mut origins = vec![config.client_origin.as_str().to_string()];
    if config.is_development() {
        origins.push(DEV_TOOLING_ORIGIN.to_string());
    }
    origins
}

/// State for the CORS stage
#[derive(Debug, Clone)]
pub struct CorsStage {
    pub(super) allowed: Arc<[HeaderValue]>,
    pub(super) probe: Option<StageProbe>,
}

impl CorsStage {
    pub(super) fn new(origins: &[String], probe: Option<StageProbe>) -> Self {
        let allowed = origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        Self {
            allowed: allowed.into(),
            probe,
        }
    }

    /// Whether an `Origin` header value is allowed
    pub fn allows(&self, origin: &HeaderValue) -> bool {
        self.allowed.iter().any(|allowed| allowed == origin)
    }

    /// `tower-http` layer producing the CORS response headers
    pub(super) fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.allowed.iter().cloned()))
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
    }
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(axum::http::header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Deny requests from origins outside the allowed set
///
/// Runs outside the [`CorsLayer`] of the same stage. Successful preflights are
/// answered with `204 No Content`.
pub async fn enforce_origin(State(stage): State<CorsStage>, req: Request, next: Next) -> Response {
    super::enter(stage.probe.as_ref(), PipelineStage::Cors);

    if let Some(origin) = req.headers().get(ORIGIN)
        && !stage.allows(origin)
    {
        let origin = origin.to_str().unwrap_or("<invalid>").to_string();
        info!(origin = %origin, "denying request from disallowed origin");
        return RequestError::OriginNotAllowed { origin }.into_response();
    }

    let preflight = is_preflight(&req);
    let mut response = next.run(req).await;
    if preflight && response.status() == StatusCode::OK {
        debug!("answered CORS preflight");
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
            ACCESS_CONTROL_REQUEST_METHOD,
        },
        middleware::from_fn_with_state,
        routing::post,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::Environment;

    const CLIENT: &str = "http://localhost:5173";

    fn config(environment: Environment) -> AppConfig {
        AppConfig {
            environment,
            ..AppConfig::for_testing()
        }
    }

    fn app(environment: Environment) -> Router {
        let stage = CorsStage::new(&allowed_origins(&config(environment)), None);
        Router::new()
            .route("/", post(|| async { "ok" }))
            .layer(stage.layer())
            .layer(from_fn_with_state(stage, enforce_origin))
    }

    fn request(method: Method, origin: Option<&str>) -> Request {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(origin) = origin {
            builder = builder.header(ORIGIN, origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn development_adds_tooling_origin() {
        assert_eq!(
            allowed_origins(&config(Environment::Development)),
            [CLIENT, DEV_TOOLING_ORIGIN]
        );
        assert_eq!(allowed_origins(&config(Environment::Production)), [CLIENT]);
        assert_eq!(allowed_origins(&config(Environment::Testing)), [CLIENT]);
    }

    #[tokio::test]
    async fn client_origin_gets_credentialed_headers() {
        let response = app(Environment::Production)
            .oneshot(request(Method::POST, Some(CLIENT)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], CLIENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn tooling_origin_depends_on_mode() {
        let response = app(Environment::Development)
            .oneshot(request(Method::POST, Some(DEV_TOOLING_ORIGIN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN],
            DEV_TOOLING_ORIGIN
        );

        let response = app(Environment::Production)
            .oneshot(request(Method::POST, Some(DEV_TOOLING_ORIGIN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn requests_without_origin_pass() {
        let response = app(Environment::Production)
            .oneshot(request(Method::POST, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn preflight_is_no_content() {
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(ORIGIN, CLIENT)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app(Environment::Production).oneshot(preflight).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], CLIENT);
    }
}
