pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod types;
pub mod urlnorm;

pub use cache::{CacheStats, SharedCache};
pub use config::{FilenameFormat, SiteConfig, SnifferConfig, SortOrder};
pub use error::SniffError;
pub use events::{EmittedEvent, EventBus, SnifferEvent};
pub use types::*;
