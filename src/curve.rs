//! Shape metrics of an averaged response curve.
//!
//! Both metrics work on a smoothing spline of the curve rather than on the
//! raw samples:
//!
//! * FWHM: zeros of `spline(x, y − half_max)` with
//!   `half_max = (max(y) + min(y)) / 2`. Anything other than exactly two
//!   crossings falls back to the pair `(0, 1)` with a warning.
//! * Amplitude: arg-max of the spline evaluated at the sample positions.
use serde::Serialize;

use crate::error::Result;
use crate::spline::SmoothingSpline;

/// Half-maximum crossings of a response curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fwhm {
    pub left: f64,
    pub right: f64,
    /// Set when the fit did not cross half maximum exactly twice and the
    /// fallback pair was returned.
    pub degenerate: bool,
}

impl Fwhm {
    const FALLBACK: Self = Self { left: 0.0, right: 1.0, degenerate: true };

    pub fn width(&self) -> f64 {
        self.right - self.left
    }
}

/// Peak of a response curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Amplitude {
    /// Sample index of the maximum.
    pub index: usize,
    pub value: f64,
}

/// Full width at half maximum of `y` over `x`.
///
/// # Errors
///
/// Only when the spline itself cannot be fitted (see
/// [`SmoothingSpline::fit`]). A fit with the wrong number of crossings is
/// not an error.
pub fn calculate_fwhm(x: &[f64], y: &[f64], smoothing: f64) -> Result<Fwhm> {
    let (lo, hi) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let half_max = (hi + lo) / 2.0;
    let shifted: Vec<f64> = y.iter().map(|v| v - half_max).collect();

    let spline = SmoothingSpline::fit(x, &shifted, smoothing)?;
    match spline.roots().as_slice() {
        &[left, right] => Ok(Fwhm { left, right, degenerate: false }),
        roots => {
            tracing::warn!(
                n_roots = roots.len(),
                half_max,
                "FWHM needs exactly two half-maximum crossings; using fallback (0, 1)"
            );
            Ok(Fwhm::FALLBACK)
        }
    }
}

/// Peak index and value of the smoothed `y`.
pub fn calculate_amplitude(x: &[f64], y: &[f64], smoothing: f64) -> Result<Amplitude> {
    let spline = SmoothingSpline::fit(x, y, smoothing)?;
    let (index, value) = spline
        .eval_many(x)
        .into_iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    Ok(Amplitude { index, value })
}
