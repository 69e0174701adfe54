//! Stimulus-locked response windows.
//!
//! Cuts a masked `[T]` series into one window per stimulus event. All
//! windows share the length of the shortest inter-onset gap, so events
//! followed by a longer gap leave their trailing frames unused. The last
//! event has no successor to bound it and is not windowed.
//!
//! ```text
//! width     = min(frame[i+1] − frame[i])
//! window[i] = series[frame[i] − 1 .. frame[i] − 1 + width]      i = 0 .. n−2
//! ```
//!
//! The `− 1` keeps the one-frame lead of the original analysis: each
//! window starts on the frame before the onset frame.
use ndarray::{s, ArrayView1};

use crate::error::{ResponseError, Result};
use crate::responses::Responses;
use crate::stimuli::{intensity_label, StimulusTable};

/// Window `series` at every onset of `stimuli` (except the last).
///
/// Rows are grouped by [`intensity_label`].
///
/// # Errors
///
/// * [`ResponseError::InsufficientData`]: fewer than two events, or two
///   events on the same frame (zero-width windows).
/// * [`ResponseError::InvalidStimuli`]: an event on frame 0, which has no
///   preceding frame to start from.
/// * [`ResponseError::TimelineTooShort`]: a window runs past `series`.
pub fn separate_into_responses(series: ArrayView1<f64>, stimuli: &StimulusTable) -> Result<Responses> {
    let width = stimuli.shortest_interval()?;
    if width == 0 {
        return Err(ResponseError::InsufficientData { needed: 2, found: 1 });
    }

    let frames = stimuli.frames();
    let mut responses = Responses::new();
    for (ev, &frame) in stimuli.events().iter().zip(&frames).take(frames.len() - 1) {
        let start = frame.checked_sub(1).ok_or_else(|| {
            ResponseError::InvalidStimuli(format!(
                "onset at {} s falls on frame 0; windows start one frame before the onset",
                ev.seconds
            ))
        })?;
        let end = start + width;
        if end > series.len() {
            return Err(ResponseError::TimelineTooShort { required: end, available: series.len() });
        }
        responses.push_row(&intensity_label(ev.intensity), series.slice(s![start..end]));
    }
    tracing::debug!(width, events = frames.len() - 1, "separated responses");
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn series(n: usize) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| i as f64))
    }

    #[test]
    fn windows_start_one_frame_before_onset() {
        let stim = StimulusTable::from_rows(&[[2.0, 1.0], [5.0, 2.0], [9.0, 1.0]], 1.0).unwrap();
        let r = separate_into_responses(series(20).view(), &stim).unwrap();
        // width = 3; event 0 -> frames 1..4, event 1 -> frames 4..7; last event dropped.
        assert_eq!(r.get("1").unwrap().row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(r.get("2").unwrap().row(0).to_vec(), vec![4.0, 5.0, 6.0]);
        assert_eq!(r.n_events(), 2);
    }

    #[test]
    fn every_row_has_shortest_interval_columns() {
        let stim = StimulusTable::from_rows(
            &[[4.0, 1.0], [14.0, 2.0], [20.0, 1.0], [33.0, 2.0], [40.0, 3.0]],
            2.0,
        )
        .unwrap();
        let width = stim.shortest_interval().unwrap();
        let r = separate_into_responses(series(40).view(), &stim).unwrap();
        for (_, block) in &r {
            assert_eq!(block.ncols(), width);
        }
        assert_eq!(r.get("1").unwrap().nrows(), 2);
        assert_eq!(r.get("2").unwrap().nrows(), 2);
        assert!(r.get("3").is_none());
    }

    #[test]
    fn frame_zero_onset_is_rejected() {
        let stim = StimulusTable::from_rows(&[[0.0, 1.0], [3.0, 1.0]], 1.0).unwrap();
        let err = separate_into_responses(series(10).view(), &stim).unwrap_err();
        assert!(matches!(err, ResponseError::InvalidStimuli(_)));
    }

    #[test]
    fn short_series_is_rejected() {
        let stim = StimulusTable::from_rows(&[[2.0, 1.0], [8.0, 1.0], [30.0, 1.0]], 1.0).unwrap();
        let err = separate_into_responses(series(10).view(), &stim).unwrap_err();
        assert!(matches!(err, ResponseError::TimelineTooShort { required: 13, available: 10 }));
    }

    #[test]
    fn coincident_onsets_are_insufficient() {
        let stim = StimulusTable::from_rows(&[[2.0, 1.0], [2.5, 1.0], [6.0, 1.0]], 1.0).unwrap();
        let err = separate_into_responses(series(10).view(), &stim).unwrap_err();
        assert!(matches!(err, ResponseError::InsufficientData { .. }));
    }
}
