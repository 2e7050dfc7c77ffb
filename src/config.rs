// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt::Debug, fs::read_to_string};

use anyhow::{Context, Error, Result, bail};
use axum::http::HeaderValue;
use config::{Config, ConfigBuilder, Environment, FileFormat, builder::DefaultState};
use serde::Deserialize;

use crate::rate_limit::RateLimitConfig;

const DEFAULT_LISTEN: &str = "0.0.0.0:3000";
const DEFAULT_REQUEST_TIMEOUT_MS: i64 = 5_000;
const DEFAULT_BODY_LIMIT: i64 = 10 * 1024;
const DEFAULT_POOL_SIZE: u32 = 8;

#[derive(Debug, Deserialize)]
pub(crate) struct Configuration {
    server: ServerConfiguration,
    cors: CorsConfiguration,
    rate_limit: RateLimitConfiguration,
    storage: StorageConfiguration,
}

#[derive(Debug, Deserialize)]
struct ServerConfiguration {
    listen: String,
    request_timeout_ms: u64,
    body_limit: usize,
}

#[derive(Debug, Deserialize)]
struct CorsConfiguration {
    origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitConfiguration {
    max_requests: u32,
    window_secs: u64,
    max_clients: usize,
}

impl From<&RateLimitConfiguration> for RateLimitConfig {
    fn from(value: &RateLimitConfiguration) -> Self {
        Self {
            max_requests: value.max_requests,
            window_secs: value.window_secs,
            max_tracked_clients: value.max_clients,
            ..Default::default()
        }
    }
}

/// Settings for one incarnation of the HTTP listener.
#[derive(Debug, Clone)]
pub(crate) struct Server {
    listen: SocketAddr,
    request_timeout: Duration,
    body_limit: usize,
    origins: Vec<HeaderValue>,
    rate_limit: RateLimitConfig,
}

impl Server {
    pub(crate) fn listen(&self) -> SocketAddr {
        self.listen
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub(crate) fn origins(&self) -> &[HeaderValue] {
        &self.origins
    }

    pub(crate) fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }
}

#[cfg(test)]
impl Server {
    pub(crate) fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub(crate) fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub(crate) fn with_rate_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.rate_limit.max_requests = max_requests;
        self.rate_limit.window_secs = window_secs;
        self
    }
}

#[cfg(test)]
impl Default for Server {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS as u64),
            body_limit: DEFAULT_BODY_LIMIT as usize,
            origins: vec![HeaderValue::from_static("http://localhost:5500")],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct DatabaseConfiguration {
    url: Option<String>,
    url_file: Option<PathBuf>,
    #[serde(default = "default_pool_size")]
    pool_size: u32,
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

impl Debug for DatabaseConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfiguration")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("url_file", &self.url_file)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
enum StorageConfiguration {
    Memory,
    Postgres(DatabaseConfiguration),
}

pub(crate) struct Database {
    url: String,
    pool_size: u32,
}

impl Database {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

#[cfg(test)]
impl Database {
    pub(crate) fn for_tests(url: String) -> Self {
        Self { url, pool_size: 2 }
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &"[REDACTED]")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl TryFrom<&DatabaseConfiguration> for Database {
    type Error = Error;

    fn try_from(value: &DatabaseConfiguration) -> std::result::Result<Self, Self::Error> {
        let url = match (&value.url_file, &value.url) {
            (Some(file), _) => read_to_string(file)
                .with_context(|| format!("failed to read database url from {file:?}"))?
                .trim()
                .to_string(),
            (None, Some(url)) => url.clone(),
            (None, None) => bail!("postgres storage needs either `url` or `url_file`"),
        };

        Ok(Self {
            url,
            pool_size: value.pool_size,
        })
    }
}

#[derive(Debug)]
pub(crate) enum Storage {
    Memory,
    Postgres(Database),
}

impl Configuration {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("server.listen", DEFAULT_LISTEN)?
            .set_default("server.request_timeout_ms", DEFAULT_REQUEST_TIMEOUT_MS)?
            .set_default("server.body_limit", DEFAULT_BODY_LIMIT)?
            .set_default("cors.origins", Vec::<String>::new())?
            .set_default("rate_limit.max_requests", 100)?
            .set_default("rate_limit.window_secs", 15 * 60)?
            .set_default("rate_limit.max_clients", 10_000)?
            .set_default("storage.backend", "memory")?)
    }

    pub(crate) fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults()?;

        if let Some(config_file) = config_file {
            builder = builder.add_source(config::File::new(
                config_file
                    .to_str()
                    .with_context(|| format!("invalid configuration file path {config_file:?}"))?,
                FileFormat::Toml,
            ));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("JOKEKEEPER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.origins")
                    .try_parsing(true),
            )
            .build()?;

        settings
            .try_deserialize::<Configuration>()
            .context("failed to parse configuration")
    }

    pub(crate) fn server(&self) -> Result<Server> {
        let listen = self
            .server
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.server.listen))?;
        let origins = self
            .cors
            .origins
            .iter()
            .map(|origin| {
                if origin == "*" {
                    bail!("wildcard CORS origins are not supported, list the origins instead");
                }
                HeaderValue::from_str(origin)
                    .with_context(|| format!("invalid CORS origin {origin:?}"))
            })
            .collect::<Result<_>>()?;

        Ok(Server {
            listen,
            request_timeout: Duration::from_millis(self.server.request_timeout_ms),
            body_limit: self.server.body_limit,
            origins,
            rate_limit: (&self.rate_limit).into(),
        })
    }

    pub(crate) fn storage(&self) -> Result<Storage> {
        Ok(match &self.storage {
            StorageConfiguration::Memory => Storage::Memory,
            StorageConfiguration::Postgres(database) => Storage::Postgres(database.try_into()?),
        })
    }
}
