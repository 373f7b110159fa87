use anyhow::Result;
use mediasniff_common::{ResourceRecord, SnifferConfig};

use crate::context::ExtractionContext;

/// One discovery strategy. Extractors are pure over the context (no
/// network, no shared state), so the pipeline can fan them out on blocking
/// worker threads and drop any that fail without losing the rest.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this extractor runs under the given (possibly site-overlaid)
    /// configuration.
    fn enabled(&self, config: &SnifferConfig) -> bool;

    /// Produce raw records. URLs may still be relative; the pipeline
    /// resolves and normalizes afterwards.
    fn extract(&self, ctx: &ExtractionContext) -> Result<Vec<ResourceRecord>>;
}
