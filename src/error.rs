//! Typed failures for loading, masking, windowing and normalisation.
//!
//! Load-time validation problems (wrong dimensionality, mask/scan shape
//! mismatch, a stimulus timeline longer than the scan) and computation
//! problems (zero reference, fewer than two onsets) are reported as
//! [`ResponseError`] so the caller can decide whether to re-prompt or give
//! up. The one recoverable numeric case, an FWHM fit without exactly two
//! roots, is not an error: see [`crate::curve::calculate_fwhm`].
use std::fmt;
use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ResponseError>;

/// Errors produced by the response-extraction core.
#[derive(Debug)]
pub enum ResponseError {
    /// Reading or writing a file failed.
    Io { path: PathBuf, source: std::io::Error },

    /// A NIfTI volume could not be decoded.
    Nifti { path: PathBuf, message: String },

    /// A volume has the wrong number of dimensions.
    Dimensionality { expected: usize, found: usize },

    /// Mask spatial shape differs from the scan spatial shape.
    ShapeMismatch { mask: [usize; 3], scan: [usize; 3] },

    /// Onset table is malformed (negative or decreasing onsets, bad TR, …).
    InvalidStimuli(String),

    /// A response window reaches past the end of the scan.
    TimelineTooShort { required: usize, available: usize },

    /// Not enough events to derive a window length.
    InsufficientData { needed: usize, found: usize },

    /// Percentage normalisation against a zero reference.
    ZeroReference { intensity: String, row: usize },

    /// The smoothing spline could not be fitted to the input.
    SplineFit(String),

    /// A child entity was attached at the wrong level of the tree.
    InvalidChild { parent: &'static str, child: &'static str },

    /// Persisted project configuration is malformed.
    Config(String),
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Nifti { path, message } => {
                write!(f, "failed to read NIfTI volume {}: {message}", path.display())
            }
            Self::Dimensionality { expected, found } => {
                write!(f, "expected a {expected}-D volume, got {found}-D")
            }
            Self::ShapeMismatch { mask, scan } => write!(
                f,
                "mask shape {mask:?} does not match scan spatial shape {scan:?}"
            ),
            Self::InvalidStimuli(msg) => write!(f, "invalid stimulus table: {msg}"),
            Self::TimelineTooShort { required, available } => write!(
                f,
                "stimulus timeline needs {required} frames but the scan has {available}"
            ),
            Self::InsufficientData { needed, found } => write!(
                f,
                "need at least {needed} stimulus events to derive a response window, found {found}"
            ),
            Self::ZeroReference { intensity, row } => write!(
                f,
                "percentage normalisation with zero reference (intensity {intensity}, event {row})"
            ),
            Self::SplineFit(msg) => write!(f, "spline fit failed: {msg}"),
            Self::InvalidChild { parent, child } => {
                write!(f, "a {child} cannot be added to a {parent}")
            }
            Self::Config(msg) => write!(f, "invalid project configuration: {msg}"),
        }
    }
}

impl std::error::Error for ResponseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ResponseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
