//! Persisted project files.
//!
//! A project is stored as one JSON document mirroring the tree:
//!
//! ```json
//! {
//!   "name": "pain study",
//!   "plot_settings": {"global": false, "percent": true, "use_mask": true, "use_stimuli": true},
//!   "mask": {"path": "roi.nii.gz"},
//!   "stimuli": {"path": "onsets.txt", "tr": 2.0},
//!   "groups": [{
//!     "name": "controls",
//!     "individuals": [{
//!       "name": "s01",
//!       "sessions": [{"name": "run1", "path": "s01_run1.nii.gz", "anatomy_path": "s01_t1.nii.gz"}]
//!     }]
//!   }],
//!   "current": [0, 0]
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the project
//! file and kept absolute in memory; [`save`] writes paths below the target
//! file's directory relative to it again. Referenced files that no longer
//! exist are collected into [`LoadedProject::missing`] and their nodes stay
//! unpopulated; a file that exists but cannot be decoded is still an error,
//! as is a scan that does not fit the mask or stimuli it inherits.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{ResponseError, Result};
use crate::io::{read_mask, read_scan, read_stimuli};
use crate::tree::{Entity, Inherited, Level, PlotSettings};

/// Deepest selection path (project → group → individual → session).
pub const MAX_SELECTION_DEPTH: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskRef {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimuliRef {
    pub path: PathBuf,
    pub tr: f64,
}

/// One node of the persisted tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_settings: Option<PlotSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anatomy_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<MaskRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stimuli: Option<StimuliRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<NodeConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub individuals: Vec<NodeConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<NodeConfig>,
}

/// Top-level document: the project node plus the UI selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(flatten)]
    pub root: NodeConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub current: Vec<usize>,
}

/// Result of [`load`].
#[derive(Debug)]
pub struct LoadedProject {
    pub project: Entity,
    /// Selection path, dropped when it no longer resolves.
    pub current: Vec<usize>,
    /// Referenced files that were not found.
    pub missing: Vec<PathBuf>,
}

/// Read a project file and every scan, mask and stimulus table it names.
pub fn load(path: &Path) -> Result<LoadedProject> {
    let text = std::fs::read_to_string(path).map_err(|e| ResponseError::io(path, e))?;
    let file: ProjectFile = serde_json::from_str(&text)
        .map_err(|e| ResponseError::Config(format!("{}: {e}", path.display())))?;
    from_config(&file, &absolute_dir(path)?)
}

/// Build the tree from an already parsed document.
pub fn from_config(file: &ProjectFile, base: &Path) -> Result<LoadedProject> {
    if file.current.len() > MAX_SELECTION_DEPTH {
        return Err(ResponseError::Config(format!(
            "selection path {:?} is deeper than {MAX_SELECTION_DEPTH}",
            file.current
        )));
    }

    let mut missing = Vec::new();
    let cfg = AnalysisConfig::default();
    let project = build(&file.root, Level::Project, base, &Inherited::root(&cfg), &mut missing)?;

    let current = if project.descendant(&file.current).is_some() {
        file.current.clone()
    } else {
        tracing::warn!(current = ?file.current, "saved selection no longer exists; cleared");
        Vec::new()
    };
    if !missing.is_empty() {
        tracing::warn!(count = missing.len(), files = ?missing, "project references missing files");
    }
    Ok(LoadedProject { project, current, missing })
}

/// Write `project` and the selection `current` as pretty JSON.
///
/// Paths inside the directory of `path` are stored relative to it.
pub fn save(project: &Entity, current: &[usize], path: &Path) -> Result<()> {
    let mut file = to_config(project, current);
    relativize(&mut file.root, &absolute_dir(path)?);
    let text = serde_json::to_string_pretty(&file)
        .map_err(|e| ResponseError::Config(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| ResponseError::io(path, e))?;
    tracing::info!(path = %path.display(), "project saved");
    Ok(())
}

/// Persisted form of `project`.
pub fn to_config(project: &Entity, current: &[usize]) -> ProjectFile {
    ProjectFile { root: node_config(project), current: current.to_vec() }
}

fn node_config(e: &Entity) -> NodeConfig {
    let d = e.defaults();
    let children: Vec<NodeConfig> = e.children().iter().map(node_config).collect();
    let mut node = NodeConfig {
        name: e.name.clone(),
        description: e.description.clone(),
        plot_settings: d.plot_settings(),
        path: e.scan_path().cloned(),
        anatomy_path: e.anatomy_path().cloned(),
        mask: d.mask_path.clone().map(|path| MaskRef { path }),
        stimuli: match (&d.stimuli_path, d.stimuli_tr) {
            (Some(path), Some(tr)) => Some(StimuliRef { path: path.clone(), tr }),
            _ => None,
        },
        ..NodeConfig::default()
    };
    match e.level() {
        Level::Project => node.groups = children,
        Level::Group => node.individuals = children,
        Level::Individual => node.sessions = children,
        Level::Session => {}
    }
    node
}

fn build(
    cfg: &NodeConfig,
    level: Level,
    base: &Path,
    ctx: &Inherited<'_>,
    missing: &mut Vec<PathBuf>,
) -> Result<Entity> {
    let mut entity = Entity::new(level, cfg.name.clone());
    entity.description = cfg.description.clone();
    if let Some(plot) = &cfg.plot_settings {
        entity.set_plot_settings(*plot);
    }

    let mut lost_scan = None;
    let mut lost_mask = None;
    let mut lost_stimuli = None;

    // Stimuli and mask first so the scan is validated against them.
    if let Some(stim) = &cfg.stimuli {
        let p = resolve(base, &stim.path);
        if p.exists() {
            let table = read_stimuli(&p, stim.tr)?;
            entity.load_stimuli(table, Some(p))?;
        } else {
            missing.push(p.clone());
            lost_stimuli = Some((p, stim.tr));
        }
    }
    if let Some(mask) = &cfg.mask {
        let p = resolve(base, &mask.path);
        if p.exists() {
            entity.load_mask(read_mask(&p)?, Some(p))?;
        } else {
            missing.push(p.clone());
            lost_mask = Some(p);
        }
    }
    if let Some(scan_path) = &cfg.path {
        let p = resolve(base, scan_path);
        if level != Level::Session {
            tracing::warn!(node = %cfg.name, "scan path on a non-session node ignored");
        } else if p.exists() {
            entity.load_scan_within(read_scan(&p)?, Some(p), ctx)?;
        } else {
            missing.push(p.clone());
            lost_scan = Some(p);
        }
    }
    entity.set_anatomy_path(cfg.anatomy_path.as_ref().map(|p| resolve(base, p)));
    entity.remember_missing(lost_scan, lost_mask, lost_stimuli);

    let (children, stray) = match level {
        Level::Project => (&cfg.groups, cfg.individuals.len() + cfg.sessions.len()),
        Level::Group => (&cfg.individuals, cfg.groups.len() + cfg.sessions.len()),
        Level::Individual => (&cfg.sessions, cfg.groups.len() + cfg.individuals.len()),
        Level::Session => (&cfg.sessions, cfg.groups.len() + cfg.individuals.len()),
    };
    if stray > 0 {
        tracing::warn!(node = %cfg.name, stray, "children at the wrong level ignored");
    }
    if let Some(child_level) = level.child() {
        let built = {
            let here = entity.defaults().inherit(ctx);
            children
                .iter()
                .map(|child| build(child, child_level, base, &here, missing))
                .collect::<Result<Vec<_>>>()?
        };
        for child in built {
            entity.add_child(child)?;
        }
    } else if !children.is_empty() {
        tracing::warn!(node = %cfg.name, "sessions cannot have children; ignored");
    }
    Ok(entity)
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

/// Directory holding `file`, made absolute against the working directory.
fn absolute_dir(file: &Path) -> Result<PathBuf> {
    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| ResponseError::io(dir, e))?;
    Ok(cwd.join(dir))
}

fn relativize(node: &mut NodeConfig, dir: &Path) {
    let strip = |p: &mut PathBuf| {
        if let Ok(rel) = p.strip_prefix(dir) {
            *p = rel.to_path_buf();
        }
    };
    for p in node.path.iter_mut().chain(&mut node.anatomy_path) {
        strip(p);
    }
    if let Some(mask) = &mut node.mask {
        strip(&mut mask.path);
    }
    if let Some(stim) = &mut node.stimuli {
        strip(&mut stim.path);
    }
    for child in node.groups.iter_mut().chain(&mut node.individuals).chain(&mut node.sessions) {
        relativize(child, dir);
    }
}
