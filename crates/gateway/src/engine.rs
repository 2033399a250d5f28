// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! GraphQL execution engine module
//!
//! [`GraphQlEngine`] wraps the composed schema with a start/stop lifecycle.
//! The engine must be given a [`DrainHandle`] before it starts; stopping the
//! engine drains the transport and waits until it has stopped.

use std::{fmt, sync::OnceLock};

use async_graphql::{BatchRequest, BatchResponse, Request, Response};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    context::RequestContext,
    error::{ServerError, ServerResult},
    schema::ComposedSchema,
    transport::DrainHandle,
};

/// Lifecycle states of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, not executing operations
    NotStarted,
    /// Executing operations
    Started,
    /// Draining; requests on open connections still execute
    Stopping,
    /// No longer executing operations
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::NotStarted => write!(f, "not_started"),
            EngineState::Started => write!(f, "started"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Execution engine bound to one composed schema
pub struct GraphQlEngine {
    schema: ComposedSchema,
    state: watch::Sender<EngineState>,
    drain: OnceLock<DrainHandle>,
}

impl GraphQlEngine {
    /// Create an engine in the `NotStarted` state
    pub fn new(schema: ComposedSchema) -> Self {
        let (state, _) = watch::channel(EngineState::NotStarted);
        Self {
            schema,
            state,
            drain: OnceLock::new(),
        }
    }

    /// The schema this engine executes against
    pub fn schema(&self) -> &ComposedSchema {
        &self.schema
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Whether operations are currently executed
    pub fn is_accepting(&self) -> bool {
        matches!(self.state(), EngineState::Started | EngineState::Stopping)
    }

    /// Install the hook used to drain the transport on stop
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Engine` if a hook is already registered.
    pub fn register_drain(&self, handle: DrainHandle) -> ServerResult<()> {
        self.drain
            .set(handle)
            .map_err(|_| ServerError::engine("drain hook already registered"))?;
        debug!("drain hook registered");
        Ok(())
    }

    /// Start executing operations
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Engine` if no drain hook is registered or the
    /// engine has already been started.
    pub fn start(&self) -> ServerResult<()> {
        if self.drain.get().is_none() {
            return Err(ServerError::engine(
                "drain hook must be registered before start",
            ));
        }
        self.advance(EngineState::NotStarted, EngineState::Started)?;
        info!(query_type = %self.schema.query_type(), "GraphQL engine started");
        Ok(())
    }

    /// Stop the engine, draining the transport
    ///
    /// Resolves once the transport has stopped.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Engine` unless the engine is started.
    pub async fn stop(&self) -> ServerResult<()> {
        self.advance(EngineState::Started, EngineState::Stopping)?;
        info!("GraphQL engine stopping");

        if let Some(drain) = self.drain.get() {
            drain.drain();
            drain.stopped().await;
        }

        self.state.send_replace(EngineState::Stopped);
        info!("GraphQL engine stopped");
        Ok(())
    }

    /// Execute one operation with the given context
    pub async fn execute(&self, request: Request, context: RequestContext) -> Response {
        self.schema.execute(request.data(context)).await
    }

    /// Execute a single operation or a batch, sharing one context
    pub async fn execute_batch(&self, batch: BatchRequest, context: RequestContext) -> BatchResponse {
        match batch {
            BatchRequest::Single(request) => {
                BatchResponse::Single(self.execute(request, context).await)
            }
            BatchRequest::Batch(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in requests {
                    responses.push(self.execute(request, context.clone()).await);
                }
                BatchResponse::Batch(responses)
            }
        }
    }

    fn advance(&self, from: EngineState, to: EngineState) -> ServerResult<()> {
        let mut current = from;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if moved {
            Ok(())
        } else {
            Err(ServerError::engine(format!(
                "cannot move engine to {to} while {current}"
            )))
        }
    }
}

impl fmt::Debug for GraphQlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlEngine")
            .field("state", &self.state())
            .field("drain_registered", &self.drain.get().is_some())
            .finish_non_exhaustive()
    }
}
