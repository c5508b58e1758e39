use std::collections::TryReserveError;

use crate::video::frame::Chroma;

/// A specialized Result type for the distort effect.
pub type DistortResult<T> = Result<T, DistortError>;

/// Errors raised by the effect and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum DistortError {
    /// The upstream format is not one of the planar YUV layouts the effect handles.
    #[error("unsupported chroma {0}, distort only handles planar YUV")]
    UnsupportedChroma(Chroma),

    /// The downstream sink could not be opened.
    #[error("can't open output sink: {0}")]
    SinkUnavailable(String),

    /// Output buffer allocation failed.
    #[error("failed to allocate {bytes} bytes for an output plane")]
    Allocation {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    /// Plane data does not match the frame format it claims.
    #[error("plane geometry mismatch: {0}")]
    Geometry(String),

    #[error("unknown distort mode {0:?}, expected \"wave\" or \"ripple\"")]
    UnknownMode(String),

    #[error("sink I/O error: {0}")]
    Sink(#[from] std::io::Error),
}

impl DistortError {
    /// Whether this error happened while setting up the stream.
    ///
    /// Setup failures are not fatal to the host: the effect is simply not
    /// applied and frames flow through untouched.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            DistortError::UnsupportedChroma(_) | DistortError::SinkUnavailable(_)
        )
    }
}
