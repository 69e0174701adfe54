//! Read-only view of a tree for listing and selection.
//!
//! [`Outline`] borrows an [`Entity`] together with the context it would be
//! computed under, and answers the questions a front end asks: what to call
//! a node, whether it can be computed, whether its cache is current, and
//! what lies below it.
use std::fmt::{self, Write};

use crate::tree::{CacheState, Entity, Inherited, Level};

/// A node seen under a fixed inherited context.
#[derive(Clone, Copy)]
pub struct Outline<'a> {
    entity: &'a Entity,
    ctx: Inherited<'a>,
}

/// Status shown next to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Missing scan, mask or stimuli somewhere it matters.
    NotReady,
    Uncomputed,
    Cached,
    Stale,
}

impl Status {
    fn marker(self) -> &'static str {
        match self {
            Self::NotReady => "-",
            Self::Uncomputed => " ",
            Self::Cached => "*",
            Self::Stale => "~",
        }
    }
}

impl<'a> Outline<'a> {
    /// Outline of `root` under the top-level context `ctx`.
    pub fn new(root: &'a Entity, ctx: Inherited<'a>) -> Self {
        Self { entity: root, ctx }
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// Display name, falling back to the level when unnamed.
    pub fn label(&self) -> String {
        if self.entity.name.is_empty() {
            format!("<{}>", self.entity.level().name())
        } else {
            self.entity.name.clone()
        }
    }

    pub fn status(&self) -> Status {
        if !self.entity.ready_for_calculation(&self.ctx) {
            return Status::NotReady;
        }
        match self.entity.cache_state(&self.ctx) {
            CacheState::Uncomputed => Status::Uncomputed,
            CacheState::Cached => Status::Cached,
            CacheState::Stale => Status::Stale,
        }
    }

    /// Children, each seen under this node's effective context.
    pub fn children(&self) -> Vec<Outline<'a>> {
        let here = self.entity.defaults().inherit(&self.ctx);
        self.entity
            .children()
            .iter()
            .map(|c| Outline { entity: c, ctx: here })
            .collect()
    }

    /// Indices of every ready descendant session, relative to this node.
    pub fn ready_sessions(&self) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        collect_ready(self, &mut Vec::new(), &mut out);
        out
    }

    /// Indented text tree, one line per node.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = render_into(self, 0, &mut out);
        out
    }
}

fn collect_ready(node: &Outline<'_>, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if node.entity.level() == Level::Session {
        if node.status() != Status::NotReady {
            out.push(prefix.clone());
        }
        return;
    }
    for (i, child) in node.children().iter().enumerate() {
        prefix.push(i);
        collect_ready(child, prefix, out);
        prefix.pop();
    }
}

fn render_into(node: &Outline<'_>, depth: usize, out: &mut String) -> fmt::Result {
    let e = node.entity;
    write!(out, "{}[{}] {} {}", "  ".repeat(depth), node.status().marker(), e.level().name(), node.label())?;
    if let Some(scan) = e.scan() {
        let (x, y, z, t) = scan.data().dim();
        write!(out, "  ({x}x{y}x{z}, {t} frames)")?;
    }
    if e.defaults().mask.is_some() {
        out.push_str("  +mask");
    }
    if e.defaults().stimuli.is_some() {
        out.push_str("  +stimuli");
    }
    writeln!(out)?;
    for child in node.children() {
        render_into(&child, depth + 1, out)?;
    }
    Ok(())
}

impl fmt::Debug for Outline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outline")
            .field("label", &self.label())
            .field("status", &self.status())
            .finish()
    }
}
