//! SATCHEL Core - Types and Leaf Logic
//!
//! Pure building blocks for the tagged-cache framework: the error
//! taxonomy, the expiration/time-expression resolver, namespace-scoped
//! key naming, configuration types, and the adapter capability
//! descriptor. No I/O happens in this crate.

pub mod capability;
pub mod config;
pub mod error;
pub mod keys;
pub mod time;

pub use capability::AdapterCapabilities;
pub use error::{
    CapabilityError, ConfigError, SatchelError, SatchelResult, StoreError, StoreResult, TimeError,
};
pub use keys::{Keyspace, DEFAULT_SEPARATOR};
pub use time::{Expires, ShiftParams};

// Re-export configuration types for registry integration
pub use config::{
    AdapterKind, AdapterSpec, CacheOptions, CacheProfile, ConnectionParams, RegistryConfig,
    DEFAULT_TTL_SECS,
};
