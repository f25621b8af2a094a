//! SATCHEL Store - Key-Value Store Capability
//!
//! Defines the store abstraction the cache engine runs against and the
//! in-memory reference implementation. The Redis implementation lives
//! in satchel-redis.

pub mod batch;
pub mod memory;
pub mod traits;

pub use batch::{WriteBatch, WriteOp};
pub use memory::MemoryStore;
pub use satchel_core::StoreResult;
pub use traits::Store;
