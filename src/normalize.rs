//! Response normalisation.
//!
//! Every event row `r` is rescaled against a reference value:
//!
//! ```text
//! ref  = global ? mean(nonzero scan voxels) : r[0]
//! r'   = percentage ? r / ref · 100 : r − ref
//! ```
//!
//! The global reference is computed once per call; the local reference is
//! each row's own first (pre-stimulus) frame.
use serde::{Deserialize, Serialize};

use crate::error::{ResponseError, Result};
use crate::responses::Responses;
use crate::scan::Scan;

/// How response rows are normalised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Normalization {
    /// Divide and scale to percent instead of subtracting.
    pub percentage: bool,
    /// Use the whole-scan mean instead of each row's baseline frame.
    pub global: bool,
}

impl Normalization {
    pub fn new(percentage: bool, global: bool) -> Self {
        Self { percentage, global }
    }
}

/// Mean of all nonzero voxels over space and time.
pub fn global_reference(scan: &Scan) -> f64 {
    scan.nonzero_mean()
}

/// Normalise every row of `responses` in place.
///
/// # Errors
///
/// [`ResponseError::ZeroReference`] when percentage normalisation meets a
/// zero (or non-finite) reference. Rows before the failing one are already
/// rewritten; callers discard the dictionary on error.
pub fn normalize(responses: &mut Responses, settings: Normalization, scan: &Scan) -> Result<()> {
    let global = settings.global.then(|| global_reference(scan));

    for (label, block) in responses.iter_mut() {
        for (i, mut row) in block.rows_mut().into_iter().enumerate() {
            let reference = match global {
                Some(g) => g,
                None => row[0],
            };
            if settings.percentage {
                if reference == 0.0 || !reference.is_finite() {
                    return Err(ResponseError::ZeroReference { intensity: label.clone(), row: i });
                }
                row.mapv_inplace(|v| v / reference * 100.0);
            } else {
                row.mapv_inplace(|v| v - reference);
            }
        }
    }
    Ok(())
}
