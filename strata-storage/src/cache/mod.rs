//! Named-cache backends.
//!
//! The engine addresses one named cache per entity type through the
//! object-safe [`CacheBackend`] trait. [`InMemoryCacheBackend`] is the
//! default backend and the one used in tests.

mod memory;
mod traits;

pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
