//! Key/value caching: a backend seam, the typed [`CacheStore`] on top of it,
//! the key namespace registry and read-through domain caching.

pub mod backend;
pub mod domain;
pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod store;

pub use backend::{BackendInfo, CacheBackend, Expiry};
pub use domain::DomainCache;
pub use memory::MemoryCacheBackend;
pub use redis_backend::RedisCacheBackend;
pub use store::CacheStore;
