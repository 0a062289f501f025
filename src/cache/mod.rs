pub mod freshness;
pub mod store;

pub use freshness::FreshnessDescriptor;
pub use store::{CacheEntry, CachePayload, CacheStats, FreshnessCache};
