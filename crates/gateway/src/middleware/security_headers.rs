// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Security headers stage

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::{PipelineStage, StageProbe};

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

const CONTENT_SECURITY_POLICY: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';\
script-src 'self';script-src-attr 'none';style-src 'self' https: 'unsafe-inline';\
upgrade-insecure-requests";

const BASELINE_HEADERS: [(&str, &str); 11] = [
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// State for the security headers stage
#[derive(Debug, Clone)]
pub struct SecurityHeadersStage {
    pub(super) headers: Arc<[(HeaderName, HeaderValue)]>,
    pub(super) probe: Option<StageProbe>,
}

impl SecurityHeadersStage {
    /// Build the header set
    ///
    /// The content security policy is left out in development mode so that
    /// browser-based tooling can load.
    pub(super) fn new(development: bool, probe: Option<StageProbe>) -> Self {
        let policy = (!development).then_some(("content-security-policy", CONTENT_SECURITY_POLICY));
        let headers = policy
            .into_iter()
            .chain(BASELINE_HEADERS)
            .map(|(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
            .collect::<Vec<_>>();

        Self {
            headers: headers.into(),
            probe,
        }
    }

    /// Headers applied to every response
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

/// Apply the security header set to the response
///
/// Headers already set by inner handlers are left alone.
pub async fn apply_security_headers(
    State(stage): State<SecurityHeadersStage>,
    req: Request,
    next: Next,
) -> Response {
    super::enter(stage.probe.as_ref(), PipelineStage::SecurityHeaders);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in stage.headers.iter() {
        if !headers.contains_key(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    headers.remove(X_POWERED_BY);
    response
}
