//! Per-intensity summaries handed to the presentation layer.
use std::collections::BTreeMap;

use ndarray::Array1;

use crate::config::AnalysisConfig;
use crate::curve::{calculate_amplitude, calculate_fwhm, Amplitude, Fwhm};
use crate::responses::Responses;
use crate::stats::{column_count, column_mean, column_sem, column_std};

/// Statistics of one intensity's response matrix.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Event rows that went into the statistics.
    pub events: usize,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub sem: Array1<f64>,
    /// Valid samples per column.
    pub count: Array1<usize>,
    /// `None` when the mean curve cannot carry a spline (too short, or
    /// containing columns without valid samples).
    pub fwhm: Option<Fwhm>,
    pub amplitude: Option<Amplitude>,
}

/// Summarise every intensity in `responses`.
pub fn summarize(responses: &Responses, cfg: &AnalysisConfig) -> BTreeMap<String, Summary> {
    responses
        .iter()
        .map(|(label, block)| {
            let mean = column_mean(block, cfg.missing);
            let (xs, ys) = (frame_axis(mean.len()), mean.to_vec());

            let fwhm = calculate_fwhm(&xs, &ys, cfg.smoothing)
                .map_err(|e| tracing::debug!(intensity = %label, error = %e, "no FWHM"))
                .ok();
            let amplitude = calculate_amplitude(&xs, &ys, cfg.smoothing)
                .map_err(|e| tracing::debug!(intensity = %label, error = %e, "no amplitude"))
                .ok();

            let summary = Summary {
                events: block.nrows(),
                std: column_std(block, cfg.missing),
                sem: column_sem(block, cfg.missing),
                count: column_count(block, cfg.missing),
                mean,
                fwhm,
                amplitude,
            };
            (label.clone(), summary)
        })
        .collect()
}

/// Frame indices `0, 1, …, width - 1` as the x axis of a response curve.
pub fn frame_axis(width: usize) -> Vec<f64> {
    (0..width).map(|i| i as f64).collect()
}
