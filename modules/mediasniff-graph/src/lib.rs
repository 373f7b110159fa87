//! Authoritative resource storage: the per-tab graph, the fingerprint
//! representative cache, and the opaque key/value persistence seam.

pub mod fingerprint_cache;
pub mod graph;
pub mod store;

pub use fingerprint_cache::{FingerprintCache, FingerprintEntry};
pub use graph::ResourceGraph;
pub use store::{keys, JsonFileStore, KeyValueStore, MemoryStore};
