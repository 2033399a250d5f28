// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! GraphQL mount point
//!
//! Serves GraphQL over HTTP under [`API_PREFIX`]:
//!
//! - `POST` with a JSON body holding one operation or a batch array
//! - `GET` with `query`, `operationName`, `variables` and `extensions` in the
//!   query string; mutations are refused over `GET`
//!
//! Every request gets a fresh [`RequestContext`] built from the request parts
//! and a [`ResponseHandle`]. Paths outside the prefix answer `404`.

use std::sync::Arc;

use async_graphql::{
    BatchRequest, BatchResponse, Request as GraphQlRequest,
    http::parse_query_string,
    parser::{
        parse_query,
        types::{DocumentOperations, OperationType},
    },
};
use async_graphql_axum::GraphQLResponse;
use axum::{
    Router,
    extract::{Request, State},
    http::{Method, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::any,
};
use tracing::debug;

use crate::{
    context::{RequestContext, ResponseHandle},
    engine::GraphQlEngine,
    error::RequestError,
    middleware::ParsedBody,
};

/// Path prefix the GraphQL endpoint is mounted on
pub const API_PREFIX: &str = "/api";

/// Router serving the GraphQL endpoint
pub fn router(engine: Arc<GraphQlEngine>) -> Router {
    Router::new()
        .route(API_PREFIX, any(graphql))
        .route(&format!("{API_PREFIX}/{{*rest}}"), any(graphql))
        .fallback(not_found)
        .with_state(engine)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn graphql(State(engine): State<Arc<GraphQlEngine>>, req: Request) -> Response {
    if !engine.is_accepting() {
        debug!(state = %engine.state(), "rejecting request, engine not running");
        return RequestError::EngineUnavailable.into_response();
    }

    let (mut parts, _body) = req.into_parts();
    let batch = match read_operations(&mut parts) {
        Ok(batch) => batch,
        Err(e) => {
            debug!(error = %e, method = %parts.method, "unusable GraphQL request");
            return e.into_response();
        }
    };

    let response_handle = ResponseHandle::new();
    let context = RequestContext::new(parts, response_handle.clone());
    let result = engine.execute_batch(batch, context).await;

    let status = if is_request_error(&result) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    let mut response = GraphQLResponse::from(result).into_response();
    *response.status_mut() = status;
    response.headers_mut().extend(response_handle.take_headers());
    response
}

fn read_operations(parts: &mut Parts) -> Result<BatchRequest, RequestError> {
    match parts.method {
        Method::GET => {
            let query = parts.uri.query().unwrap_or_default();
            let request = parse_query_string(query)
                .map_err(|e| RequestError::bad_request(format!("invalid query string: {e}")))?;
            if request.query.is_empty() {
                return Err(RequestError::bad_request("GET requests must carry a query"));
            }
            if is_mutation(&request) {
                return Err(RequestError::MethodNotAllowed {
                    message: "mutations cannot be sent over GET".to_string(),
                });
            }
            Ok(BatchRequest::Single(request))
        }
        Method::POST => {
            let ParsedBody(body) = parts.extensions.remove::<ParsedBody>().ok_or_else(|| {
                RequestError::bad_request("POST requests must carry a JSON body")
            })?;
            serde_json::from_value(body)
                .map_err(|e| RequestError::bad_request(format!("invalid GraphQL request: {e}")))
        }
        _ => Err(RequestError::MethodNotAllowed {
            message: format!("{} is not supported, use GET or POST", parts.method),
        }),
    }
}

fn is_mutation(request: &GraphQlRequest) -> bool {
    let Ok(document) = parse_query(&request.query) else {
        return false;
    };
    let operation = match &document.operations {
        DocumentOperations::Single(operation) => Some(operation),
        DocumentOperations::Multiple(operations) => request
            .operation_name
            .as_deref()
            .and_then(|name| operations.get(name)),
    };
    operation.is_some_and(|operation| operation.node.ty == OperationType::Mutation)
}

/// A request that failed before execution: no data and no error tied to a field
fn is_request_error(result: &BatchResponse) -> bool {
    match result {
        BatchResponse::Single(response) => {
            response.data == async_graphql::Value::Null
                && !response.errors.is_empty()
                && response.errors.iter().all(|error| error.path.is_empty())
        }
        BatchResponse::Batch(_) => false,
    }
}
