use thiserror::Error;

#[derive(Error, Debug)]
pub enum SniffError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No protocol adapter for scheme: {0}")]
    AdapterUnsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Download interrupted after {bytes_received} bytes: {reason}")]
    Interrupted { bytes_received: u64, reason: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SniffError {
    /// User-initiated stops are not failures; they log at INFO and never
    /// count against retry budgets.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SniffError::Cancelled)
    }
}
