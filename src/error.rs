/// Result type alias for call negotiation
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of a negotiation operation.
///
/// Connectivity failures are not represented here: they are handled by the
/// ICE monitor through automatic teardown.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user refused access to the capture device
    #[error("capture permission denied: {0}")]
    Permission(String),

    /// No capture device for a requested media kind
    #[error("capture device unavailable: {0}")]
    Device(String),

    /// Empty or malformed session description text
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    /// The transport handle could not be constructed
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A transport call failed while negotiating
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Capture errors end the current negotiation attempt.
    pub fn is_capture_error(&self) -> bool {
        matches!(self, Error::Permission(_) | Error::Device(_))
    }
}
