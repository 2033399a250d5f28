// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration module
//!
//! This module provides the configuration structure for the gateway. The
//! configuration is loaded exactly once at startup and handed to the
//! orchestrator by reference; nothing downstream reads the process
//! environment on its own.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use serde::{Deserialize, Deserializer, Serialize, de};
use url::Url;

use crate::error::{ServerError, ServerResult};

/// Conventional variable names read on top of the prefixed ones
const CONVENTIONAL_VARIABLES: [(&str, &str); 4] = [
    ("PORT", "port"),
    ("SECRET", "cookie_secret"),
    ("CLIENT_URL", "client_origin"),
    ("NODE_ENV", "environment"),
];

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // We'll validate this during configuration loading when we know the environment
        Ok(Self {
            port,
            environment: Environment::Development, // temporary, will be fixed during load
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Create a safe default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Process-wide secret used to sign and verify cookies
///
/// The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieSecret(String);

impl CookieSecret {
    /// Create a new `CookieSecret`
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or only whitespace
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        ensure!(!secret.trim().is_empty(), "cookie secret cannot be empty");
        Ok(Self(secret))
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for CookieSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CookieSecret(..)")
    }
}

impl<'de> Deserialize<'de> for CookieSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secret = String::deserialize(deserializer)?;
        Self::new(secret).map_err(|e| de::Error::custom(e.to_string()))
    }
}

/// Origin of the browser client allowed to call the gateway
///
/// Stored in its serialized origin form (`scheme://host[:port]`), which is the
/// exact value browsers send in the `Origin` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientOrigin(String);

impl ClientOrigin {
    /// Parse a client URL into its origin
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s)
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| anyhow!("invalid client url {raw:?}: {e}"))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "client url must use http or https, got {}",
            url.scheme()
        );
        let origin = url.origin();
        ensure!(origin.is_tuple(), "client url {raw:?} has no origin");
        Ok(Self(origin.ascii_serialization()))
    }

    /// The origin string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ClientOrigin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl fmt::Display for ClientOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Environment types for configuration
///
/// Only `development` relaxes the CORS and security header policy. `test` and
/// `testing` select the testing environment; every other value, including
/// `staging` or `prod`, is treated as production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl Environment {
    /// Interpret a mode flag such as `NODE_ENV`
    pub fn from_mode(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "development" => Self::Development,
            "test" | "testing" => Self::Testing,
            _ => Self::Production,
        }
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mode = String::deserialize(deserializer)?;
        Ok(Self::from_mode(&mode))
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// Gateway configuration
///
/// Port, cookie secret and client origin have no defaults: a deployment that
/// forgets one of them fails at startup instead of listening somewhere
/// unexpected.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listening address
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Listening port (validated for environment compatibility)
    pub port: ServerPort,
    /// Secret used to verify signed cookies
    pub cookie_secret: CookieSecret,
    /// Browser client allowed by the CORS stage
    pub client_origin: ClientOrigin,
    /// Environment type
    pub environment: Environment,
    /// Upper bound on connection draining at shutdown (1-300 seconds)
    #[serde(default)]
    pub drain_timeout_seconds: TimeoutSeconds,
}

impl AppConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with GATEWAY_ prefix (`GATEWAY_COOKIE_SECRET`, ...)
    /// 5. Conventional variables: `PORT`, `SECRET`, `CLIENT_URL`, `NODE_ENV`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("NODE_ENV")
            .or_else(|_| std::env::var("GATEWAY_ENVIRONMENT"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let mut config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("drain_timeout_seconds", 30)?
            .add_source(File::with_name("config.json").required(false))
            .add_source(File::with_name(&format!("config.{env_var}.json")).required(false))
            .add_source(
                ConfigEnv::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (variable, key) in CONVENTIONAL_VARIABLES {
            if let Ok(value) = std::env::var(variable) {
                config_builder = config_builder.set_override(key, value)?;
            }
        }

        Self::from_config(config_builder.build()?)
    }

    /// Deserialize and validate an already assembled configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is missing or fails validation.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut app_config: Self = config.try_deserialize()?;

        // Fix the ServerPort to have the correct environment context
        app_config.port = ServerPort::new(app_config.port.value(), app_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(app_config)
    }

    /// Create configuration optimized for testing
    #[allow(clippy::missing_panics_doc)]
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(), // let OS choose available port
            #[allow(clippy::unwrap_used)]
            cookie_secret: CookieSecret::new("testing-secret").unwrap(),
            #[allow(clippy::unwrap_used)]
            client_origin: ClientOrigin::parse("http://localhost:5173").unwrap(),
            environment: Environment::Testing,
            drain_timeout_seconds: TimeoutSeconds::testing(),
        }
    }

    /// Whether development tooling should be accommodated
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}
