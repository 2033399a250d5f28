// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware pipeline module
//!
//! Every request passes through the same four stages, in the order declared by
//! [`PIPELINE`], before it can reach the GraphQL mount:
//!
//! 1. [`cookies`]: parse and verify cookies
//! 2. [`body`]: buffer and parse JSON bodies, enforcing the size ceiling
//! 3. [`cors`]: enforce the allowed origin policy
//! 4. [`security_headers`]: apply the security header set
//!
//! Oversized and malformed bodies are therefore rejected before any origin
//! policy is evaluated.

pub mod body;
pub mod cookies;
pub mod cors;
pub mod security_headers;

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use axum::{Router, middleware::from_fn_with_state};
use tower::ServiceBuilder;
use tracing::debug;

pub use body::{BODY_LIMIT_BYTES, ParsedBody};
pub use cookies::{CookieSigner, RequestCookies};
pub use cors::{DEV_TOOLING_ORIGIN, allowed_origins};

use crate::config::AppConfig;

/// One stage of the middleware pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Cookie parsing
    Cookies,
    /// JSON body parsing with size ceiling
    Body,
    /// Cross-origin policy
    Cors,
    /// Security response headers
    SecurityHeaders,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Cookies => write!(f, "cookies"),
            PipelineStage::Body => write!(f, "body"),
            PipelineStage::Cors => write!(f, "cors"),
            PipelineStage::SecurityHeaders => write!(f, "security_headers"),
        }
    }
}

/// Stage execution order
pub const PIPELINE: [PipelineStage; 4] = [
    PipelineStage::Cookies,
    PipelineStage::Body,
    PipelineStage::Cors,
    PipelineStage::SecurityHeaders,
];

/// Records the stages a request entered, in order
#[derive(Debug, Clone, Default)]
pub struct StageProbe {
    entered: Arc<Mutex<Vec<PipelineStage>>>,
}

impl StageProbe {
    /// Create an empty probe
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, stage: PipelineStage) {
        self.entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }

    /// Stages entered so far
    pub fn entered(&self) -> Vec<PipelineStage> {
        self.entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget recorded stages
    pub fn clear(&self) {
        self.entered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn enter(probe: Option<&StageProbe>, stage: PipelineStage) {
    debug!(stage = %stage, "entering pipeline stage");
    if let Some(probe) = probe {
        probe.record(stage);
    }
}

/// The assembled middleware pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    cookies: cookies::CookieStage,
    body: body::BodyStage,
    cors: cors::CorsStage,
    security_headers: security_headers::SecurityHeadersStage,
}

impl Pipeline {
    /// Build the pipeline for a configuration
    pub fn new(config: &AppConfig) -> Self {
        Self::build(config, None)
    }

    /// Build the pipeline with a probe recording stage entry
    pub fn with_probe(config: &AppConfig, probe: StageProbe) -> Self {
        Self::build(config, Some(probe))
    }

    fn build(config: &AppConfig, probe: Option<StageProbe>) -> Self {
        let origins = allowed_origins(config);
        debug!(origins = ?origins, development = config.is_development(), "assembling pipeline");

        Self {
            cookies: cookies::CookieStage {
                signer: CookieSigner::new(&config.cookie_secret),
                probe: probe.clone(),
            },
            body: body::BodyStage {
                limit: BODY_LIMIT_BYTES,
                probe: probe.clone(),
            },
            cors: cors::CorsStage::new(&origins, probe.clone()),
            security_headers: security_headers::SecurityHeadersStage::new(
                config.is_development(),
                probe,
            ),
        }
    }

    /// Wrap an application in the pipeline
    ///
    /// Stages are layered innermost first, so the first stage of [`PIPELINE`]
    /// sees the request first. The wrapping covers every route of `app` and its
    /// fallback.
    pub fn wrap(self, app: Router) -> Router {
        PIPELINE.iter().rev().fold(app, |app, stage| match stage {
            PipelineStage::Cookies => {
                app.layer(from_fn_with_state(self.cookies.clone(), cookies::parse_cookies))
            }
            PipelineStage::Body => {
                app.layer(from_fn_with_state(self.body.clone(), body::parse_json_body))
            }
            PipelineStage::Cors => app.layer(
                ServiceBuilder::new()
                    .layer(from_fn_with_state(self.cors.clone(), cors::enforce_origin))
                    .layer(self.cors.layer()),
            ),
            PipelineStage::SecurityHeaders => app.layer(from_fn_with_state(
                self.security_headers.clone(),
                security_headers::apply_security_headers,
            )),
        })
    }
}
