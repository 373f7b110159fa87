//! Service wiring for the resource-processing core: the inbound message
//! router and the HTTP server that fronts it.

pub mod router;
pub mod server;

pub use router::{ApiDownloadOptions, CoreService};
pub use server::app;
