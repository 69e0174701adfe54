//! Project → Group → Individual → Session hierarchy.
//!
//! Every node is an [`Entity`]. Sessions own a [`Scan`]; any node may own a
//! mask, a stimulus table and normalisation settings that act as defaults
//! for its descendants (see [`Defaults`]). Effective parameters are
//! resolved top-down into an [`Inherited`] context that is passed
//! explicitly to every query.
//!
//! # Aggregation
//!
//! ```text
//! Session:  scan ─ apply_mask ─ separate_into_responses ─ normalize ─► Responses
//! Parent:   ⋃ ready children (row concatenation per intensity)
//!           └─ truncate every matrix to the narrowest merged width
//! ```
//!
//! Results are cached per node under a [`Fingerprint`] hashed from the
//! values that feed the computation: normalisation flags, mask content,
//! stimulus events and TR, the scan's load identity and, for inner nodes,
//! the fingerprints of all ready children. A node whose fingerprint is
//! unchanged returns its cached dictionary without recomputing.
mod defaults;

pub use defaults::{Defaults, Inherited, PlotSettings};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::epoch::separate_into_responses;
use crate::error::{ResponseError, Result};
use crate::mask::{apply_mask, Mask};
use crate::normalize::normalize;
use crate::responses::Responses;
use crate::scan::Scan;
use crate::stimuli::StimulusTable;

/// Value-based cache key.
pub type Fingerprint = u64;

/// Position of a node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Project,
    Group,
    Individual,
    Session,
}

impl Level {
    /// The only level allowed directly below this one.
    pub fn child(self) -> Option<Level> {
        match self {
            Self::Project => Some(Self::Group),
            Self::Group => Some(Self::Individual),
            Self::Individual => Some(Self::Session),
            Self::Session => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Group => "group",
            Self::Individual => "individual",
            Self::Session => "session",
        }
    }
}

/// When an inner node counts as ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyPolicy {
    /// At least one child is ready; unready children are skipped.
    #[default]
    Any,
    /// There is at least one child and every child is ready.
    All,
}

/// Cache status of a node under a given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Uncomputed,
    Cached,
    Stale,
}

#[derive(Debug, Clone, Default)]
struct Cache {
    fingerprint: Option<Fingerprint>,
    responses: Responses,
    /// Masked series keyed by (scan id, mask hash).
    masked: Option<((u64, u64), Array1<f64>)>,
    computations: usize,
}

/// One node of the analysis tree.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub description: String,
    level: Level,
    defaults: Defaults,
    scan: Option<Scan>,
    scan_path: Option<PathBuf>,
    anatomy_path: Option<PathBuf>,
    children: Vec<Entity>,
    cache: Cache,
}

impl Entity {
    pub fn new(level: Level, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            level,
            defaults: Defaults::default(),
            scan: None,
            scan_path: None,
            anatomy_path: None,
            children: Vec::new(),
            cache: Cache::default(),
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self::new(Level::Project, name)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(Level::Group, name)
    }

    pub fn individual(name: impl Into<String>) -> Self {
        Self::new(Level::Individual, name)
    }

    pub fn session(name: impl Into<String>) -> Self {
        Self::new(Level::Session, name)
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.children.get_mut(index)
    }

    pub fn scan(&self) -> Option<&Scan> {
        self.scan.as_ref()
    }

    pub fn scan_path(&self) -> Option<&PathBuf> {
        self.scan_path.as_ref()
    }

    pub fn anatomy_path(&self) -> Option<&PathBuf> {
        self.anatomy_path.as_ref()
    }

    // ── structure ─────────────────────────────────────────────────────────

    /// Attach `child` and return a handle to it.
    ///
    /// # Errors
    ///
    /// [`ResponseError::InvalidChild`] unless `child` sits exactly one level
    /// below `self`.
    pub fn add_child(&mut self, child: Entity) -> Result<&mut Entity> {
        if self.level.child() != Some(child.level) {
            return Err(ResponseError::InvalidChild {
                parent: self.level.name(),
                child: child.level.name(),
            });
        }
        self.children.push(child);
        self.invalidate();
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Detach and return the child at `index`.
    pub fn remove_child(&mut self, index: usize) -> Option<Entity> {
        if index >= self.children.len() {
            return None;
        }
        self.invalidate();
        Some(self.children.remove(index))
    }

    /// Node reached by following child indices from `self`.
    pub fn descendant(&self, path: &[usize]) -> Option<&Entity> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children.get(i)?.descendant(rest),
        }
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Entity> {
        match path.split_first() {
            None => Some(self),
            Some((&i, rest)) => self.children.get_mut(i)?.descendant_mut(rest),
        }
    }

    /// Every session below (or at) this node.
    pub fn sessions(&self) -> Vec<&Entity> {
        if self.level == Level::Session {
            return vec![self];
        }
        self.children.iter().flat_map(|c| c.sessions()).collect()
    }

    // ── loading ───────────────────────────────────────────────────────────

    /// Attach a scan to a session.
    ///
    /// # Errors
    ///
    /// * [`ResponseError::Config`] on a non-session node.
    /// * [`ResponseError::ShapeMismatch`] if the session's own mask does not
    ///   fit the scan.
    /// * [`ResponseError::TimelineTooShort`] if the session's own stimulus
    ///   windows run past the scan.
    pub fn load_scan(&mut self, scan: Scan, path: Option<PathBuf>) -> Result<()> {
        if self.level != Level::Session {
            return Err(ResponseError::Config(format!(
                "only sessions hold scans, '{}' is a {}",
                self.name,
                self.level.name()
            )));
        }
        if let Some(mask) = &self.defaults.mask {
            mask.check_matches(&scan)?;
        }
        if let Some(stimuli) = &self.defaults.stimuli {
            stimuli.validate_against(scan.n_frames())?;
        }
        tracing::info!(session = %self.name, shape = ?scan.data().dim(), "scan loaded");
        self.scan = Some(scan);
        self.scan_path = path;
        self.cache.masked = None;
        self.invalidate();
        Ok(())
    }

    /// [`load_scan`](Self::load_scan), additionally checking the scan against
    /// the mask and stimulus table this session inherits under `ctx`.
    ///
    /// # Errors
    ///
    /// As [`load_scan`](Self::load_scan), for inherited parameters too.
    pub fn load_scan_within(&mut self, scan: Scan, path: Option<PathBuf>, ctx: &Inherited<'_>) -> Result<()> {
        let here = self.defaults.inherit(ctx);
        if let Some(mask) = here.mask {
            mask.check_matches(&scan)?;
        }
        if let Some(stimuli) = here.stimuli {
            stimuli.validate_against(scan.n_frames())?;
        }
        self.load_scan(scan, path)
    }

    /// Record file references whose content could not be loaded, so they
    /// survive a save.
    pub(crate) fn remember_missing(
        &mut self,
        scan: Option<PathBuf>,
        mask: Option<PathBuf>,
        stimuli: Option<(PathBuf, f64)>,
    ) {
        if scan.is_some() {
            self.scan_path = scan;
        }
        if mask.is_some() {
            self.defaults.mask_path = mask;
        }
        if let Some((path, tr)) = stimuli {
            self.defaults.stimuli_path = Some(path);
            self.defaults.stimuli_tr = Some(tr);
        }
    }

    pub fn set_anatomy_path(&mut self, path: Option<PathBuf>) {
        self.anatomy_path = path;
    }

    /// Replace this node's own mask. The previous mask is dropped.
    ///
    /// # Errors
    ///
    /// [`ResponseError::ShapeMismatch`] on a session whose scan has a
    /// different spatial shape.
    pub fn load_mask(&mut self, mask: Mask, path: Option<PathBuf>) -> Result<()> {
        if let Some(scan) = &self.scan {
            mask.check_matches(scan)?;
        }
        self.defaults.mask = Some(mask);
        self.defaults.mask_path = path;
        self.invalidate();
        Ok(())
    }

    pub fn clear_mask(&mut self) {
        self.defaults.mask = None;
        self.defaults.mask_path = None;
        self.invalidate();
    }

    /// Replace this node's own stimulus table.
    ///
    /// # Errors
    ///
    /// [`ResponseError::TimelineTooShort`] on a session whose scan is shorter
    /// than the table's windows need.
    pub fn load_stimuli(&mut self, stimuli: StimulusTable, path: Option<PathBuf>) -> Result<()> {
        if let Some(scan) = &self.scan {
            stimuli.validate_against(scan.n_frames())?;
        }
        self.defaults.stimuli_tr = Some(stimuli.tr());
        self.defaults.stimuli = Some(stimuli);
        self.defaults.stimuli_path = path;
        self.invalidate();
        Ok(())
    }

    /// Change the TR of this node's own stimulus table.
    pub fn set_tr(&mut self, tr: f64) -> Result<()> {
        let Some(current) = &self.defaults.stimuli else {
            return Err(ResponseError::Config(format!("'{}' has no stimulus table", self.name)));
        };
        let path = self.defaults.stimuli_path.clone();
        let table = current.with_tr(tr)?;
        self.load_stimuli(table, path)
    }

    pub fn clear_stimuli(&mut self) {
        self.defaults.stimuli = None;
        self.defaults.stimuli_path = None;
        self.defaults.stimuli_tr = None;
        self.invalidate();
    }

    /// Override the normalisation for this node and its descendants.
    pub fn set_plot_settings(&mut self, plot: PlotSettings) {
        self.defaults.apply_plot_settings(&plot);
    }

    /// Drop the override and inherit normalisation again.
    pub fn clear_plot_settings(&mut self) {
        self.defaults.normalization = None;
        self.defaults.use_mask = true;
        self.defaults.use_stimuli = true;
    }

    // ── readiness & cache ─────────────────────────────────────────────────

    /// Whether [`aggregate`](Self::aggregate) would produce responses.
    pub fn ready_for_calculation(&self, ctx: &Inherited<'_>) -> bool {
        let here = self.defaults.inherit(ctx);
        match self.level {
            Level::Session => self.scan.is_some() && here.mask.is_some() && here.stimuli.is_some(),
            _ => match here.policy {
                ReadyPolicy::Any => self.children.iter().any(|c| c.ready_for_calculation(&here)),
                ReadyPolicy::All => {
                    !self.children.is_empty()
                        && self.children.iter().all(|c| c.ready_for_calculation(&here))
                }
            },
        }
    }

    /// Cache key for the current inputs, `None` when not ready.
    pub fn fingerprint(&self, ctx: &Inherited<'_>) -> Option<Fingerprint> {
        if !self.ready_for_calculation(ctx) {
            return None;
        }
        let here = self.defaults.inherit(ctx);
        let mut h = DefaultHasher::new();
        self.level.hash(&mut h);
        match self.level {
            Level::Session => {
                here.normalization.hash(&mut h);
                here.mask.map(Mask::content_hash).hash(&mut h);
                here.stimuli.map(StimulusTable::content_hash).hash(&mut h);
                self.scan.as_ref().map(Scan::id).hash(&mut h);
            }
            _ => {
                for (i, child) in self.children.iter().enumerate() {
                    if let Some(fp) = child.fingerprint(&here) {
                        (i, fp).hash(&mut h);
                    }
                }
            }
        }
        Some(h.finish())
    }

    /// Whether the inputs differ from those the cache was built from.
    pub fn settings_changed(&self, ctx: &Inherited<'_>) -> bool {
        self.cache.fingerprint.is_none() || self.fingerprint(ctx) != self.cache.fingerprint
    }

    pub fn cache_state(&self, ctx: &Inherited<'_>) -> CacheState {
        match self.cache.fingerprint {
            None => CacheState::Uncomputed,
            Some(_) if self.settings_changed(ctx) => CacheState::Stale,
            Some(_) => CacheState::Cached,
        }
    }

    /// Number of times this node has recomputed its responses.
    pub fn compute_count(&self) -> usize {
        self.cache.computations
    }

    /// Cached responses from the last successful aggregation.
    pub fn responses(&self) -> Option<&Responses> {
        self.cache.fingerprint.map(|_| &self.cache.responses)
    }

    /// Forget the cached responses of this node.
    pub fn invalidate(&mut self) {
        self.cache.fingerprint = None;
        self.cache.responses = Responses::new();
    }

    // ── aggregation ───────────────────────────────────────────────────────

    /// Responses of this node, recomputed only when the inputs changed.
    ///
    /// Returns `Ok(None)` when the node is not ready.
    ///
    /// # Errors
    ///
    /// Any masking, windowing or normalisation error of a contributing
    /// session aborts the whole aggregation; the node is left uncomputed.
    pub fn aggregate(&mut self, ctx: &Inherited<'_>) -> Result<Option<&Responses>> {
        let Some(fp) = self.fingerprint(ctx) else {
            return Ok(None);
        };
        if self.cache.fingerprint != Some(fp) {
            self.invalidate();
            self.cache.responses = self.recompute(ctx)?;
            self.cache.fingerprint = Some(fp);
        }
        Ok(Some(&self.cache.responses))
    }

    /// [`aggregate`](Self::aggregate) the node at `path`, resolving the
    /// inherited context through its ancestors.
    pub fn aggregate_at(&mut self, path: &[usize], ctx: &Inherited<'_>) -> Result<Option<&Responses>> {
        match path.split_first() {
            None => self.aggregate(ctx),
            Some((&i, rest)) => {
                let here = self.defaults.inherit(ctx);
                let n = self.children.len();
                let child = self.children.get_mut(i).ok_or_else(|| {
                    ResponseError::Config(format!("child index {i} out of range ({n} children)"))
                })?;
                child.aggregate_at(rest, &here)
            }
        }
    }

    fn recompute(&mut self, ctx: &Inherited<'_>) -> Result<Responses> {
        self.cache.computations += 1;
        tracing::debug!(
            level = self.level.name(),
            name = %self.name,
            run = self.cache.computations,
            "recomputing responses"
        );
        let here = self.defaults.inherit(ctx);
        match self.level {
            Level::Session => {
                let scan = self.scan.as_ref().ok_or_else(|| missing(&self.name, "scan"))?;
                let mask = here.mask.ok_or_else(|| missing(&self.name, "mask"))?;
                let stimuli = here.stimuli.ok_or_else(|| missing(&self.name, "stimulus table"))?;
                prepare_for_calculation(scan, mask, stimuli, &here, &mut self.cache.masked)
            }
            _ => {
                let mut merged = Responses::new();
                let mut min_width: Option<usize> = None;
                for child in self.children.iter_mut() {
                    if !child.ready_for_calculation(&here) {
                        continue;
                    }
                    if let Some(part) = child.aggregate(&here)? {
                        if let Some(w) = part.min_width() {
                            min_width = Some(min_width.map_or(w, |m| m.min(w)));
                        }
                        merged.merge(part);
                    }
                }
                if let Some(w) = min_width {
                    merged.truncate(w);
                }
                Ok(merged)
            }
        }
    }
}

fn missing(name: &str, what: &str) -> ResponseError {
    ResponseError::Config(format!("'{name}' has no {what}"))
}

/// Mask, window and normalise one session.
fn prepare_for_calculation(
    scan: &Scan,
    mask: &Mask,
    stimuli: &StimulusTable,
    here: &Inherited<'_>,
    masked: &mut Option<((u64, u64), Array1<f64>)>,
) -> Result<Responses> {
    mask.check_matches(scan)?;
    stimuli.validate_against(scan.n_frames())?;

    let key = (scan.id(), mask.content_hash());
    let series = match masked.take() {
        Some((k, series)) if k == key => series,
        _ => apply_mask(scan, mask)?,
    };
    let result = separate_into_responses(series.view(), stimuli);
    *masked = Some((key, series));

    let mut responses = result?;
    normalize(&mut responses, here.normalization, scan)?;
    Ok(responses)
}
