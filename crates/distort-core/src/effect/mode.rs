use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::DistortError;

/// Which displacement the effect draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Sine displacement over the whole picture.
    #[default]
    Wave,
    /// Mirrored, growing ripple over the bottom fifth of the picture.
    Ripple,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Wave => write!(f, "wave"),
            Mode::Ripple => write!(f, "ripple"),
        }
    }
}

impl FromStr for Mode {
    type Err = DistortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wave" => Ok(Mode::Wave),
            "ripple" => Ok(Mode::Ripple),
            other => Err(DistortError::UnknownMode(other.to_string())),
        }
    }
}

/// Pick the mode named after the first `:` of a filter string such as
/// `distort:ripple`.
///
/// Anything else, including a missing separator, falls back to wave.
pub fn select_mode(filter: &str) -> Mode {
    let requested = filter.split_once(':').map(|(_, mode)| mode);
    match requested.map(Mode::from_str) {
        Some(Ok(mode)) => {
            debug!(filter, %mode, "distort mode selected");
            mode
        }
        _ => {
            warn!(filter, "no valid distort mode provided, using distort:wave");
            Mode::Wave
        }
    }
}
