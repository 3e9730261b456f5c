//! Broker error types.

/// The result type used throughout swarm-broker.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in broker operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The broker could not accept or deliver a record.
    #[error("broker transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A consumed record could not be decoded.
    #[error("malformed record at offset {offset}: {message}")]
    MalformedRecord {
        /// Offset of the bad record.
        offset: u64,
        /// Description of the decode failure.
        message: String,
    },

    /// An error from the orchestrator while launching a workflow.
    #[error("launch error: {0}")]
    Launch(#[from] swarm_flow::Error),
}

impl Error {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with a source.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
