//! Resource analysis: quality banding, scoring, fingerprinting, high-res
//! variant synthesis, and fingerprint/similarity deduplication, dispatched
//! through a worker pool.

pub mod analyzer;
pub mod dedup;
pub mod quality;
pub mod related;
pub mod score;
pub mod similarity;
pub mod variants;
pub mod worker;

pub use analyzer::{Analysis, Analyzer};
pub use dedup::{dedup, DedupResult, SIMILARITY_THRESHOLD};
pub use score::Scores;
pub use worker::{WorkerPool, WorkerReply, WorkerRequest};
