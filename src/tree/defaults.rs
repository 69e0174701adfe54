//! Parameters a node owns and hands down to its descendants.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::mask::Mask;
use crate::normalize::Normalization;
use crate::stimuli::StimulusTable;

use super::ReadyPolicy;

/// Mask, stimuli and normalisation owned by one node.
///
/// `use_mask` / `use_stimuli` switch the node's own mask or table off
/// without discarding it; descendants then see whatever the node itself
/// inherited.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub mask: Option<Mask>,
    pub mask_path: Option<PathBuf>,
    pub stimuli: Option<StimulusTable>,
    pub stimuli_path: Option<PathBuf>,
    /// TR recorded for `stimuli_path`, kept even when the file is missing.
    pub stimuli_tr: Option<f64>,
    pub normalization: Option<Normalization>,
    pub use_mask: bool,
    pub use_stimuli: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            mask: None,
            mask_path: None,
            stimuli: None,
            stimuli_path: None,
            stimuli_tr: None,
            normalization: None,
            use_mask: true,
            use_stimuli: true,
        }
    }
}

impl Defaults {
    /// Resolve this node's effective parameters on top of `parent`.
    pub fn inherit<'a>(&'a self, parent: &Inherited<'a>) -> Inherited<'a> {
        Inherited {
            mask: self.mask.as_ref().filter(|_| self.use_mask).or(parent.mask),
            stimuli: self.stimuli.as_ref().filter(|_| self.use_stimuli).or(parent.stimuli),
            normalization: self.normalization.unwrap_or(parent.normalization),
            policy: parent.policy,
        }
    }

    /// Persisted form of the normalisation and use flags.
    pub fn plot_settings(&self) -> Option<PlotSettings> {
        self.normalization.map(|n| PlotSettings {
            global: n.global,
            percent: n.percentage,
            use_mask: self.use_mask,
            use_stimuli: self.use_stimuli,
        })
    }

    pub fn apply_plot_settings(&mut self, plot: &PlotSettings) {
        self.normalization = Some(Normalization::new(plot.percent, plot.global));
        self.use_mask = plot.use_mask;
        self.use_stimuli = plot.use_stimuli;
    }
}

/// Effective parameters at one point of the tree.
#[derive(Debug, Clone, Copy)]
pub struct Inherited<'a> {
    pub mask: Option<&'a Mask>,
    pub stimuli: Option<&'a StimulusTable>,
    pub normalization: Normalization,
    pub policy: ReadyPolicy,
}

impl Inherited<'static> {
    /// Context above the root: nothing inherited, settings from `cfg`.
    pub fn root(cfg: &AnalysisConfig) -> Self {
        Self {
            mask: None,
            stimuli: None,
            normalization: cfg.normalization,
            policy: cfg.ready_policy,
        }
    }
}

/// Per-node display and normalisation flags as stored in project files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub global: bool,
    pub percent: bool,
    pub use_mask: bool,
    pub use_stimuli: bool,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self { global: false, percent: false, use_mask: true, use_stimuli: true }
    }
}
