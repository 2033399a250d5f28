// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Two families of errors live here. [`ServerError`] covers everything that can
//! go wrong while the gateway is being assembled, started or drained; these are
//! fatal and surface once at the orchestrator boundary. [`RequestError`] covers
//! failures local to a single HTTP request; these are turned into structured
//! JSON responses and never affect other requests.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{schema::SchemaCompositionError, transport::TransportState};

/// Fatal errors raised while bootstrapping, serving or draining the gateway
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Type definitions and resolvers could not be composed into a schema
    #[error("Schema composition failed: {0}")]
    SchemaComposition(#[from] SchemaCompositionError),

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Transport lifecycle was driven out of order
    #[error("Invalid transport transition from {from} to {to}")]
    Lifecycle {
        /// State the transport was in
        from: TransportState,
        /// State that was requested
        to: TransportState,
    },

    /// Execution engine lifecycle errors
    #[error("Engine error: {message}")]
    Engine {
        /// Error message
        message: String,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

/// Convenient From implementations for common async error types
impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

/// Failures confined to a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Request body exceeds the configured ceiling
    #[error("request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// Ceiling in bytes
        limit: usize,
    },

    /// Request could not be understood
    #[error("{message}")]
    BadRequest {
        /// Detailed error message
        message: String,
    },

    /// Cross-origin request from an origin outside the allowed set
    #[error("origin {origin} is not allowed")]
    OriginNotAllowed {
        /// Origin sent by the client
        origin: String,
    },

    /// HTTP method not supported for the requested operation
    #[error("{message}")]
    MethodNotAllowed {
        /// Detailed error message
        message: String,
    },

    /// The execution engine is not accepting operations
    #[error("GraphQL engine is not running")]
    EngineUnavailable,
}

impl RequestError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::OriginNotAllowed { .. } => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest { .. } => "bad_request",
            Self::OriginNotAllowed { .. } => "origin_not_allowed",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::EngineUnavailable => "engine_unavailable",
        }
    }

    /// Convert error to JSON response body
    pub fn to_json_response(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "status": self.status_code().as_u16()
        })
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json_response())).into_response()
    }
}
