/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
///
/// Only the edges of the pipeline produce errors: configuration files, PCM
/// blocks handed to the FFT and FFT planning itself. The per-tick path treats
/// every data problem as a silent no-op instead.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Free-form message surfaced to the application.
    #[error("{0}")]
    Message(String),
    /// Caller handed over data the engine cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be parsed or serialised.
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),
    /// The FFT backend rejected the buffers it was given.
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
