//! The key-value store capability consumed by the cache engine.

use async_trait::async_trait;
use satchel_core::StoreResult;

use crate::batch::WriteBatch;

/// A remote (or in-memory) key-value store with records, sets, and
/// per-key expiration.
///
/// This is the only surface the cache engine talks to. Implementations
/// must be thread-safe; one store handle is shared per adapter.
///
/// # Key shapes
///
/// A key holds either a record (named binary fields) or a set of string
/// members. The engine never mixes shapes on one key; behavior when a
/// caller does is implementation-defined and may surface as a command
/// error.
///
/// # Expiration
///
/// Expired keys are indistinguishable from absent keys on every read.
///
/// # Mutation
///
/// All writes go through [`Store::apply`], which executes the whole
/// batch atomically with respect to concurrent callers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend identifier for logs and error messages.
    fn kind(&self) -> &'static str;

    /// Reads one field of a record. Absent key, absent field, and
    /// expired key all yield `None`.
    async fn field(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Whether a live key of any shape exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Members of a set. Absent or expired sets yield an empty list;
    /// order is unspecified.
    async fn members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Whether `member` is in the set at `key`.
    async fn is_member(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Number of members in the set at `key`; 0 when absent.
    async fn member_count(&self, key: &str) -> StoreResult<u64>;

    /// Members present in every one of the given sets. Empty input and
    /// any absent set both yield an empty list.
    async fn intersection(&self, keys: &[String]) -> StoreResult<Vec<String>>;

    /// Members present in at least one of the given sets, deduplicated.
    async fn union(&self, keys: &[String]) -> StoreResult<Vec<String>>;

    /// All live keys starting with `prefix`, of any shape.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Applies a write batch atomically.
    async fn apply(&self, batch: WriteBatch) -> StoreResult<()>;
}
