// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! GraphQL Gateway
//!
//! Serves the sample book catalogue over GraphQL.

use anyhow::Result;
use gateway::{AppConfig, Resolver, ResolverMap, Server, ShutdownConfig, TypeDefs};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine, the environment may already be set
    let _ = dotenv::dotenv();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting GraphQL gateway with connection draining support");

    let config = AppConfig::from_env().inspect_err(|e| error!(error = %e, "invalid configuration"))?;
    let shutdown_config = ShutdownConfig::from(&config);

    let mut resolvers = ResolverMap::new();
    resolvers.extend(
        domain::resolvers()
            .into_iter()
            .map(|(type_name, field_name, resolver)| (type_name, field_name, Resolver::from(resolver))),
    );
    let type_defs = [TypeDefs::from(domain::TYPE_DEFS)];

    let server = Server::bootstrap(&config, &type_defs, &resolvers, shutdown_config)
        .await
        .inspect_err(|e| error!(error = %e, "gateway failed to start"))?;

    // NOTE: the `#[tokio::main]` task does not run a worker future, we must spawn
    let outcome = tokio::spawn(async move { server.run().await })
        .await?
        .inspect_err(|e| error!(error = %e, "gateway failed while serving"))?;

    info!(outcome = ?outcome, "GraphQL gateway exited");
    Ok(())
}
