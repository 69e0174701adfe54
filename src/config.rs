//! Analysis configuration.
//!
//! [`AnalysisConfig`] holds the tunables that are not part of the persisted
//! project tree: spline smoothing, the missing-data convention used by the
//! column statistics, and the readiness policy for inner tree nodes.
use crate::normalize::Normalization;
use crate::stats::MissingData;
use crate::tree::ReadyPolicy;

/// Configuration for summarising aggregated responses.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use fmri_response::AnalysisConfig;
///
/// let cfg = AnalysisConfig {
///     smoothing: 5.0,   // tighter spline fit
///     ..AnalysisConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Upper bound on the residual sum of squares of the smoothing spline
    /// used for FWHM and peak amplitude.
    ///
    /// `0.0` forces an interpolating spline.
    ///
    /// Default: `20.0`.
    pub smoothing: f64,

    /// Which samples the per-column mean / std / SEM skip.
    ///
    /// The legacy convention treated every exact `0.0` as missing, which
    /// drops legitimate zero responses. It is available as
    /// [`MissingData::ZeroIsMissing`] but must be asked for.
    ///
    /// Default: [`MissingData::NanIsMissing`].
    pub missing: MissingData,

    /// Readiness rule for Project / Group / Individual nodes.
    ///
    /// Default: [`ReadyPolicy::Any`] (partial trees can be computed).
    pub ready_policy: ReadyPolicy,

    /// Normalisation applied when a node does not carry its own plot
    /// settings.
    ///
    /// Default: local baseline, subtractive.
    pub normalization: Normalization,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            smoothing: 20.0,
            missing: MissingData::NanIsMissing,
            ready_policy: ReadyPolicy::Any,
            normalization: Normalization::default(),
        }
    }
}
