//! Multi-source media detection. Each extractor reads one discovery
//! surface (visible markup, stylesheets, lazy-load attributes, shadow
//! roots, embedded frames, streaming manifests, network observations,
//! URL-pattern prediction) and produces normalized resource records; the
//! pipeline fans them out and merges the results.

pub mod attribute;
pub mod context;
pub mod css;
pub mod dom;
pub mod markup;
pub mod nested;
pub mod network;
pub mod pipeline;
pub mod predictor;
pub mod shadow;
pub mod streaming;
pub mod traits;

pub use attribute::AttributeExtractor;
pub use context::ExtractionContext;
pub use css::CssExtractor;
pub use dom::DomExtractor;
pub use nested::NestedExtractor;
pub use network::NetworkExtractor;
pub use pipeline::DetectionPipeline;
pub use predictor::PatternPredictor;
pub use shadow::ShadowDomExtractor;
pub use streaming::StreamingExtractor;
pub use traits::Extractor;
