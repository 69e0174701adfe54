//! Stimulus onset tables.
//!
//! A table is an ordered list of `(onset_seconds, intensity)` events plus the
//! repetition time `TR` used to turn seconds into frame indices:
//!
//! ```text
//! frame[i] = floor(onset[i] / TR)
//! ```
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{ResponseError, Result};

/// One stimulus event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Onset {
    pub seconds: f64,
    pub intensity: f64,
}

/// Ordered stimulus events and the TR they are sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusTable {
    events: Vec<Onset>,
    tr: f64,
}

impl StimulusTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// [`ResponseError::InvalidStimuli`] if TR is not a positive finite number,
    /// or an onset is negative, non-finite or earlier than its predecessor.
    pub fn new(events: Vec<Onset>, tr: f64) -> Result<Self> {
        if !(tr.is_finite() && tr > 0.0) {
            return Err(ResponseError::InvalidStimuli(format!("TR must be positive, got {tr}")));
        }
        for (i, ev) in events.iter().enumerate() {
            if !ev.seconds.is_finite() || ev.seconds < 0.0 {
                return Err(ResponseError::InvalidStimuli(format!(
                    "onset {i} is {}, expected a non-negative time", ev.seconds
                )));
            }
            if !ev.intensity.is_finite() {
                return Err(ResponseError::InvalidStimuli(format!("intensity {i} is not finite")));
            }
        }
        if let Some(i) = events.windows(2).position(|w| w[1].seconds < w[0].seconds) {
            return Err(ResponseError::InvalidStimuli(format!(
                "onsets must be non-decreasing (event {} precedes event {i})",
                i + 1
            )));
        }
        Ok(Self { events, tr })
    }

    /// Build from `[onset_seconds, intensity]` rows.
    pub fn from_rows(rows: &[[f64; 2]], tr: f64) -> Result<Self> {
        let events = rows
            .iter()
            .map(|&[seconds, intensity]| Onset { seconds, intensity })
            .collect();
        Self::new(events, tr)
    }

    /// Same events, different repetition time.
    pub fn with_tr(&self, tr: f64) -> Result<Self> {
        Self::new(self.events.clone(), tr)
    }

    pub fn events(&self) -> &[Onset] {
        &self.events
    }

    pub fn tr(&self) -> f64 {
        self.tr
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Onset frame indices, `floor(onset / TR)`.
    pub fn frames(&self) -> Vec<usize> {
        self.events
            .iter()
            .map(|ev| (ev.seconds / self.tr).floor() as usize)
            .collect()
    }

    /// Smallest gap, in frames, between consecutive onsets.
    ///
    /// # Errors
    ///
    /// [`ResponseError::InsufficientData`] with fewer than two events.
    pub fn shortest_interval(&self) -> Result<usize> {
        let frames = self.frames();
        frames
            .windows(2)
            .map(|w| w[1] - w[0])
            .min()
            .ok_or(ResponseError::InsufficientData { needed: 2, found: frames.len() })
    }

    /// Number of scan frames the response windows of this table reach into.
    pub fn required_frames(&self) -> Result<usize> {
        let width = self.shortest_interval()?;
        let frames = self.frames();
        Ok(frames[..frames.len() - 1]
            .iter()
            .map(|&f| f.saturating_sub(1) + width)
            .max()
            .unwrap_or(0))
    }

    /// Fail if the windows do not fit into a scan of `n_frames` frames.
    pub fn validate_against(&self, n_frames: usize) -> Result<()> {
        let required = self.required_frames()?;
        if required > n_frames {
            return Err(ResponseError::TimelineTooShort { required, available: n_frames });
        }
        Ok(())
    }

    /// Hash of every event and the TR.
    pub fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.tr.to_bits().hash(&mut h);
        for ev in &self.events {
            ev.seconds.to_bits().hash(&mut h);
            ev.intensity.to_bits().hash(&mut h);
        }
        h.finish()
    }
}

/// Dictionary key for an intensity: `1.0 → "1"`, `2.5 → "2.5"`.
pub fn intensity_label(intensity: f64) -> String {
    // `+ 0.0` folds -0.0 into 0.0.
    format!("{}", intensity + 0.0)
}
