//! SATCHEL Redis - Redis Store Backend
//!
//! [`RedisStore`] implements the store capability over a multiplexed
//! Redis connection. See satchel-cache for the engine that drives it.

pub mod store;

pub use store::RedisStore;
