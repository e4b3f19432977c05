//! Scorta: read-through cache core for a content platform.
//!
//! Keys are `namespace:part[:part...]` strings over JSON payloads; writes
//! invalidate derived views by wildcard pattern rather than a reverse index.
//!
//! - **[`key`]**: the codec. Namespaced keys and eviction patterns,
//!   validated before any I/O.
//! - **[`store`] / [`backend`]**: one shared connection to the backing
//!   key-value store, behind a trait so tests run in-process.
//! - **[`typed`]**: the public get/set/evict/mget/counter surface.
//! - **[`read_through`]**: cache-then-store-of-record reads; the cache can
//!   never fail a read.
//! - **[`invalidation`]**: the declarative entity → eviction-target map and
//!   the single entry point write sites call after committing.
//! - **[`conformance`]**: checks that every declared eviction target matches
//!   a key shape some read path actually produces.
//!
//! ## Configuration
//!
//! Settings load from `config/default` and `scorta` TOML files, overridden
//! by `SCORTA`-prefixed environment variables:
//!
//! ```toml
//! endpoint = "redis://127.0.0.1:6379/0"
//! op_timeout_ms = 250
//! # ... see config.rs for all options
//! ```

pub mod backend;
pub mod conformance;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod read_through;
pub mod store;
pub mod telemetry;
pub mod ttl;
pub mod typed;

pub use backend::{KeyValueBackend, MemoryBackend, RedisBackend};
pub use config::{CacheSettings, LoadError, LogFormat, LoggingSettings};
pub use error::{CacheError, CacheResult};
pub use invalidation::{EntityKind, InvalidationMap, Invalidator, PLATFORM_MAP, Target};
pub use key::{CacheKey, KeyPattern, ns};
pub use read_through::{ReadSource, ReadThrough, get_or_load};
pub use store::CacheStore;
pub use ttl::KeyTtl;
pub use typed::TypedCache;
