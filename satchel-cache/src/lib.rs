//! SATCHEL Cache - Tagged Cache Engine and Registry
//!
//! The engine half of SATCHEL: [`TaggedCache`] speaks the tagged-item
//! protocol over any [`Store`](satchel_store::Store), [`CacheRegistry`]
//! builds and hands out adapters from configuration, and the GC policy
//! keeps the tag index honest without a scheduler.

pub mod adapter;
pub mod gc;
pub mod registry;
pub mod tags;

pub use adapter::{CacheAdapter, SetOptions, TagMatch, TaggedCache};
pub use gc::{GcPolicy, OptimizeReport};
pub use registry::CacheRegistry;
pub use tags::TagIndex;
