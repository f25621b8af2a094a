//! Error types for SATCHEL operations

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Cache [{name}] is not configured")]
    CacheNotConfigured { name: String },

    #[error("Adapter [{name}] is not configured")]
    AdapterNotConfigured { name: String },
}

/// Time resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid time expression [{expression}]: {reason}")]
    InvalidExpression { expression: String, reason: String },
}

/// Store capability errors.
///
/// Transport failures are surfaced verbatim in `reason`; the core never
/// catches or retries them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store command failed: {reason}")]
    Command { reason: String },

    #[error("Serialization error for {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Missing-feature errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Adapter [{adapter}] does not support {operation}")]
    Unsupported { adapter: String, operation: String },

    #[error("Store version {found} is below {required}, required for {feature}")]
    StoreVersionTooOld {
        found: String,
        required: String,
        feature: String,
    },
}

/// Master error type for all SATCHEL errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SatchelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),
}

/// Result type alias for SATCHEL operations.
pub type SatchelResult<T> = Result<T, SatchelError>;

/// Result type alias for store-capability operations.
pub type StoreResult<T> = Result<T, StoreError>;
