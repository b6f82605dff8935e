mod entry;
pub mod store;

pub use store::{CacheConfig, CacheStats, CacheStore};
