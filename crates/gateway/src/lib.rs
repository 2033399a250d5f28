// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! GraphQL Gateway Implementation
//!
//! This crate assembles a GraphQL-over-HTTP service around externally supplied
//! type definitions and resolvers, built with Axum and `async-graphql`, with an
//! ordered middleware pipeline and graceful connection draining on shutdown.
//!
//! # Module Structure
//!
//! - [`config`]: Gateway configuration with hierarchical loading and validated values
//! - [`error`]: Fatal server errors and request-local HTTP errors
//! - [`schema`]: Composition of SDL type definitions and resolvers into an executable schema
//! - [`middleware`]: The cookie, body, CORS and security header stages, in fixed order
//! - [`transport`]: Listening socket lifecycle and connection draining
//! - [`engine`]: GraphQL execution engine with start/stop lifecycle and drain hook
//! - [`context`]: Per-request context handed to resolvers
//! - [`mount`]: The `/api` GraphQL endpoint
//! - [`server`]: Bootstrap orchestrator and shutdown signal handling
//!
//! # Startup Sequence
//!
//! [`Server::bootstrap`] composes the schema, creates the transport, attaches
//! the pipeline and the mount, starts the engine with its drain hook and binds
//! the socket. Any failure aborts startup with a [`ServerError`].

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod mount;
pub mod schema;
pub mod server;
pub mod transport;

pub use config::{AppConfig, Environment};
pub use context::{RequestContext, ResponseHandle};
pub use engine::{EngineState, GraphQlEngine};
pub use error::{RequestError, ServerError, ServerResult};
pub use middleware::{PIPELINE, Pipeline, PipelineStage, StageProbe};
pub use mount::API_PREFIX;
pub use schema::{
    ComposedSchema, Resolver, ResolverMap, SchemaCompositionError, TypeDefs, compose, resolver,
};
pub use server::{Server, ShutdownConfig};
pub use transport::{DrainHandle, DrainOutcome, Transport, TransportState};
