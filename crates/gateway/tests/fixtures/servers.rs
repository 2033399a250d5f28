// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

//! Gateway server fixtures
//!
//! Provides a schema, resolvers and a bootstrapped server for integration tests.

use std::{net::SocketAddr, time::Duration};

use async_graphql::{Value, dynamic::FieldFuture};
use gateway::{
    AppConfig, Environment, RequestContext, ResolverMap, Server, ShutdownConfig, TransportState,
    TypeDefs,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Origin configured as the browser client in every fixture config
pub const CLIENT_ORIGIN: &str = "http://localhost:5173";

/// Type definitions served by fixture gateways
pub const TYPE_DEFS: &str = r"
    type Query {
        hello: String!
        slow(ms: Int!): String!
        whoami: String
    }

    type Mutation {
        remember(name: String!): Boolean!
    }
";

/// Resolvers for [`TYPE_DEFS`]
pub fn resolvers() -> ResolverMap {
    ResolverMap::new()
        .field("Query", "hello", |_| {
            FieldFuture::new(async move { Ok(Some(Value::from("world"))) })
        })
        .field("Query", "slow", |ctx| {
            FieldFuture::new(async move {
                let ms = ctx.args.try_get("ms")?.u64()?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Some(Value::from("done")))
            })
        })
        .field("Query", "whoami", |ctx| {
            FieldFuture::new(async move {
                let context = ctx.data::<RequestContext>()?;
                let user = context
                    .cookies()
                    .and_then(|cookies| cookies.get_signed("user"))
                    .and_then(|user| user.as_str())
                    .map(Value::from);
                Ok(user)
            })
        })
        .field("Mutation", "remember", |ctx| {
            FieldFuture::new(async move {
                let name = ctx.args.try_get("name")?.string()?.to_string();
                let context = ctx.data::<RequestContext>()?;
                context.set_signed_cookie("user", &name, "Path=/; HttpOnly")?;
                Ok(Some(Value::from(true)))
            })
        })
}

/// Testing configuration in the given environment
pub fn config(environment: Environment) -> AppConfig {
    AppConfig {
        environment,
        ..AppConfig::for_testing()
    }
}

/// A gateway running in the background
pub struct TestGateway {
    /// Bound address
    pub addr: SocketAddr,
    /// Cancelling starts the drain
    pub shutdown: CancellationToken,
    /// Transport lifecycle
    pub state: watch::Receiver<TransportState>,
}

impl TestGateway {
    /// URL of the GraphQL endpoint
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

/// Bootstrap a gateway serving [`TYPE_DEFS`] and run it in the background
pub async fn spawn(config: AppConfig) -> TestGateway {
    let server = Server::bootstrap(
        &config,
        &[TypeDefs::new(TYPE_DEFS)],
        &resolvers(),
        ShutdownConfig::from(&config),
    )
    .await
    .expect("Failed to bootstrap gateway");

    let state = server.transport_state();
    let (addr, shutdown) = server
        .run_for_testing()
        .await
        .expect("Failed to start test server");

    TestGateway {
        addr,
        shutdown,
        state,
    }
}
