//! # fmri-response: stimulus-locked response analysis for fMRI
//!
//! `fmri-response` turns 4-D BOLD scans into per-intensity response curves.
//! A region-of-interest mask reduces each scan to one time series, a table
//! of stimulus onsets cuts that series into equal-length windows, and the
//! windows are baseline-normalised, pooled across sessions, individuals and
//! groups, and summarised (mean, SD, SEM, FWHM, peak amplitude).
//!
//! ## Pipeline overview
//!
//! ```text
//! bold.nii.gz ─ io::read_scan()          [X, Y, Z, T] f64 + affine + TR
//!   │
//!   ├─ mask::apply_mask()                 mean of non-zero scan × mask per frame → [T]
//!   ├─ epoch::separate_into_responses()   window per onset, width = shortest interval
//!   ├─ normalize::normalize()             − baseline  or  ÷ baseline × 100
//!   │    │
//!   │    └─→ Responses                    intensity → [events, width]
//!   │
//!   ├─ tree::Entity::aggregate()          row-concatenate ready children, cached
//!   └─ summary::summarize()               mean / std / SEM / FWHM / amplitude
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use fmri_response::{project, AnalysisConfig, Inherited, summarize};
//! use std::path::Path;
//!
//! let mut loaded = project::load(Path::new("study.json")).unwrap();
//! let cfg = AnalysisConfig::default();
//! let ctx = Inherited::root(&cfg);
//!
//! if let Some(responses) = loaded.project.aggregate(&ctx).unwrap() {
//!     for (intensity, s) in summarize(responses, &cfg) {
//!         println!("{intensity}: {} events, peak {:?}", s.events, s.amplitude);
//!     }
//! }
//! ```
//!
//! ## Running individual steps
//!
//! ```
//! use fmri_response::{apply_mask, separate_into_responses, normalize};
//! use fmri_response::{Mask, Normalization, Scan, StimulusTable};
//! use ndarray::Array4;
//!
//! let scan = Scan::new(Array4::from_elem((4, 4, 4, 20), 100.0));
//! let mask = Mask::sphere([4, 4, 4], [1.0, 1.0, 1.0], 1.0);
//! let stimuli = StimulusTable::from_rows(&[[2.0, 1.0], [8.0, 2.0], [14.0, 1.0]], 1.0).unwrap();
//!
//! let series = apply_mask(&scan, &mask).unwrap();          // [20]
//! let mut responses = separate_into_responses(series.view(), &stimuli).unwrap();
//! normalize(&mut responses, Normalization::new(true, false), &scan).unwrap();
//!
//! assert_eq!(responses.get("1").unwrap().dim(), (1, 6));
//! ```

pub mod config;
pub mod curve;
pub mod epoch;
pub mod error;
pub mod export;
pub mod io;
pub mod mask;
pub mod normalize;
pub mod outline;
pub mod project;
pub mod responses;
pub mod scan;
pub mod spline;
pub mod stats;
pub mod stimuli;
pub mod summary;
pub mod tree;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use config::AnalysisConfig;
pub use curve::{calculate_amplitude, calculate_fwhm, Amplitude, Fwhm};
pub use epoch::separate_into_responses;
pub use error::{ResponseError, Result};
pub use export::{export_safetensors, export_text, Layout};
pub use io::{read_mask, read_scan, read_stimuli};
pub use mask::{apply_mask, Mask};
pub use normalize::{global_reference, normalize, Normalization};
pub use outline::{Outline, Status};
pub use project::{LoadedProject, ProjectFile};
pub use responses::Responses;
pub use scan::Scan;
pub use spline::SmoothingSpline;
pub use stats::{column_count, column_mean, column_sem, column_std, MissingData};
pub use stimuli::{intensity_label, Onset, StimulusTable};
pub use summary::{summarize, Summary};
pub use tree::{CacheState, Defaults, Entity, Fingerprint, Inherited, Level, PlotSettings, ReadyPolicy};

/// Run the **single-session pipeline** without building a tree.
///
/// Equivalent to what a session node computes in
/// [`Entity::aggregate`], minus the caching.
///
/// # Pipeline steps
///
/// 1. Check that `mask` matches the scan's spatial shape.
/// 2. Check that every stimulus window fits into the scan.
/// 3. Reduce the scan to one series with [`apply_mask`].
/// 4. Cut the series into windows with [`separate_into_responses`].
/// 5. Baseline-normalise each window with [`normalize`].
///
/// # Errors
///
/// [`ResponseError::ShapeMismatch`], [`ResponseError::TimelineTooShort`],
/// [`ResponseError::InvalidStimuli`], [`ResponseError::InsufficientData`] or
/// [`ResponseError::ZeroReference`] from the step that failed.
///
/// # Examples
///
/// ```
/// use fmri_response::{session_responses, Mask, Normalization, Scan, StimulusTable};
/// use ndarray::Array4;
///
/// let scan = Scan::new(Array4::from_elem((3, 3, 3, 12), 50.0));
/// let mask = Mask::cube([3, 3, 3], [1.0, 1.0, 1.0], 1.0);
/// let stimuli = StimulusTable::from_rows(&[[1.0, 3.0], [5.0, 3.0], [9.0, 3.0]], 1.0).unwrap();
///
/// let r = session_responses(&scan, &mask, &stimuli, Normalization::default()).unwrap();
/// let block = r.get("3").unwrap();
/// assert_eq!(block.dim(), (2, 4));
/// assert!(block.iter().all(|&v| v == 0.0)); // flat signal, subtractive baseline
/// ```
pub fn session_responses(
    scan: &Scan,
    mask: &Mask,
    stimuli: &StimulusTable,
    normalization: Normalization,
) -> Result<Responses> {
    // 1–2. Geometry and timeline.
    mask.check_matches(scan)?;
    stimuli.validate_against(scan.n_frames())?;

    // 3. Masked mean series.
    let series = apply_mask(scan, mask)?;

    // 4. Stimulus-locked windows.
    let mut responses = separate_into_responses(series.view(), stimuli)?;

    // 5. Baseline normalisation.
    normalize(&mut responses, normalization, scan)?;
    Ok(responses)
}
