// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the bootstrap orchestrator for the gateway: it composes
//! the schema, assembles the middleware pipeline and the GraphQL mount, starts
//! the engine and binds the transport, and coordinates graceful shutdown using
//! `CancellationToken`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, http::HeaderName};
use hyper::Request;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};

use crate::{
    config::AppConfig,
    engine::GraphQlEngine,
    error::ServerResult,
    middleware::Pipeline,
    mount,
    schema::{ResolverMap, TypeDefs, compose},
    transport::{DrainOutcome, Transport, TransportState},
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_DRAIN_TIMEOUT_SECONDS: u64 = 30;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time in-flight requests get to finish once draining starts
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECONDS),
        }
    }
}

impl From<&AppConfig> for ShutdownConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            drain_timeout: config.drain_timeout_seconds.value(),
        }
    }
}

/// A bootstrapped gateway, bound and ready to serve
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: AppConfig,
    /// The single transport of the process
    transport: Transport,
    /// Execution engine shared with the mount
    engine: Arc<GraphQlEngine>,
    /// Address the transport is bound to
    local_addr: SocketAddr,
    /// Cancellation token for coordinated shutdown
    cancellation_token: CancellationToken,
}

impl Server {
    /// Bootstrap the gateway
    ///
    /// Runs, in order: schema composition, transport creation, pipeline and
    /// mount attachment, engine start with the drain hook registered, and
    /// socket binding. Either every step succeeds and the returned server is
    /// listening, or an error is returned and nothing is left running.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::SchemaComposition` if the type definitions and
    /// resolvers do not compose, `ServerError::Engine` or
    /// `ServerError::Lifecycle` if the startup sequence is violated, and
    /// `ServerError::Bind` if the configured address cannot be bound.
    pub async fn bootstrap(
        config: &AppConfig,
        type_defs: &[TypeDefs],
        resolvers: &ResolverMap,
        shutdown_config: ShutdownConfig,
    ) -> ServerResult<Self> {
        let schema = compose(type_defs, resolvers)?;
        info!(
            query_type = %schema.query_type(),
            resolvers = resolvers.len(),
            "schema composed"
        );

        let mut transport = Transport::new(shutdown_config.drain_timeout);
        let pipeline = Pipeline::new(config);
        let engine = Arc::new(GraphQlEngine::new(schema));
        let app = Self::create_router(pipeline, mount::router(Arc::clone(&engine)));
        transport.attach(app)?;

        engine.register_drain(transport.drain_handle())?;
        engine.start()?;

        let local_addr = transport.start(config.socket_addr()).await?;

        Ok(Self {
            config: config.clone(),
            transport,
            engine,
            local_addr,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Create application router with middleware
    ///
    /// Request ids and HTTP tracing wrap the pipeline, which wraps the mount.
    fn create_router(pipeline: Pipeline, mount: Router) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id, method = %req.method(), uri = %req.uri())
                    } else {
                        error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER));

        pipeline.wrap(mount).layer(middleware)
    }

    /// Serve until shutdown, then drain
    ///
    /// Shutdown is triggered by SIGINT, SIGTERM or [`Server::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Lifecycle` if the transport was never started or
    /// `ServerError::Engine` if the engine cannot be stopped.
    pub async fn run(self) -> ServerResult<DrainOutcome> {
        info!(
            address = %self.local_addr,
            environment = %self.config.environment,
            "GraphQL gateway ready",
        );

        let shutdown_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });

        self.serve().await
    }

    async fn serve(self) -> ServerResult<DrainOutcome> {
        let engine = Arc::clone(&self.engine);
        let token = self.cancellation_token.clone();
        let stopping = tokio::spawn(async move {
            token.cancelled().await;
            engine.stop().await
        });

        let outcome = self.transport.serve().await;
        if outcome.is_err() {
            stopping.abort();
        }
        let outcome = outcome?;

        stopping.await??;
        info!(outcome = ?outcome, "GraphQL gateway shut down");
        Ok(outcome)
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// This function listens for SIGINT (Ctrl+C) and SIGTERM signals,
    /// and cancels the provided cancellation token when received.
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                "CTRL+C"
            }
        };

        // Wait for either a signal or existing cancellation
        tokio::select! {
            signal_name = signal_received => {
                warn!(signal = signal_name, "shutdown signal received, draining connections");
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {
                info!("shutdown already requested, signal handler exiting");
            }
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// No signal handler is installed; cancel the returned token to drain.
    ///
    /// # Errors
    ///
    /// Infallible once bootstrapped; kept fallible for call-site symmetry with
    /// [`Server::run`].
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let addr = self.local_addr;
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                error!(error = %e, "test server failed");
            }
        });
        Ok((addr, token))
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to transport lifecycle changes
    pub fn transport_state(&self) -> watch::Receiver<TransportState> {
        self.transport.subscribe()
    }

    /// The execution engine
    pub fn engine(&self) -> &GraphQlEngine {
        &self.engine
    }

    /// Get server configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
