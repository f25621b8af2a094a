//! Configuration types for adapters, caches, and the registry.
//!
//! Everything here is plain serde-friendly data. Validation happens where
//! a value is consumed: the keyspace rejects empty namespaces and
//! separators, the time resolver rejects malformed `optimize_after`
//! expressions, and the registry checks adapter references up front.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::keys::DEFAULT_SEPARATOR;

/// Default item TTL in seconds when neither the call nor the cache
/// profile overrides it.
pub const DEFAULT_TTL_SECS: i64 = 60;

fn default_ttl() -> i64 {
    DEFAULT_TTL_SECS
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

/// Options for one cache adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Namespace scoping every key this adapter touches.
    pub namespace: String,

    /// Default TTL in seconds for writes without an explicit expiration.
    #[serde(default = "default_ttl")]
    pub ttl: i64,

    /// Separator between namespace and key segments.
    #[serde(default = "default_separator")]
    pub namespace_separator: String,

    /// Minimum interval between self-triggered optimize passes, as a
    /// time expression. Unset disables garbage collection.
    #[serde(default)]
    pub optimize_after: Option<String>,
}

impl CacheOptions {
    /// Options for `namespace` with the default TTL and separator and
    /// garbage collection disabled.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ttl: DEFAULT_TTL_SECS,
            namespace_separator: DEFAULT_SEPARATOR.to_string(),
            optimize_after: None,
        }
    }

    /// Sets the default TTL in seconds.
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the namespace separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    /// Enables garbage collection with the given minimum interval.
    pub fn with_optimize_after(mut self, expression: impl Into<String>) -> Self {
        self.optimize_after = Some(expression.into());
        self
    }
}

/// Connection parameters for a remote store.
///
/// A unix socket path overrides host and port when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub unix_socket_path: Option<PathBuf>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            unix_socket_path: None,
        }
    }
}

impl ConnectionParams {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_unix_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket_path = Some(path.into());
        self
    }
}

/// The closed set of adapter kinds the registry can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Redis,
    Memory,
}

/// A named store backend in the registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub kind: AdapterKind,

    #[serde(default)]
    pub connection: ConnectionParams,
}

/// A named cache in the registry configuration.
///
/// The cache's name becomes its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheProfile {
    /// Name of the adapter entry backing this cache.
    pub adapter: String,

    #[serde(default = "default_ttl")]
    pub ttl: i64,

    #[serde(default)]
    pub optimize_after: Option<String>,

    #[serde(default)]
    pub namespace_separator: Option<String>,
}

impl CacheProfile {
    /// Expands this profile into adapter options for `namespace`.
    pub fn to_options(&self, namespace: &str) -> CacheOptions {
        CacheOptions {
            namespace: namespace.to_string(),
            ttl: self.ttl,
            namespace_separator: self
                .namespace_separator
                .clone()
                .unwrap_or_else(default_separator),
            optimize_after: self.optimize_after.clone(),
        }
    }
}

/// Top-level registry configuration: named adapters and named caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub adapters: HashMap<String, AdapterSpec>,

    #[serde(default)]
    pub caches: HashMap<String, CacheProfile>,
}
