//! The per-intensity response dictionary.
//!
//! Every entry is an `[events, width]` matrix. Rows are appended as events
//! are windowed and as child entities are merged into their parent; a
//! matrix never holds rows of different widths.
use std::collections::btree_map::{self, BTreeMap};

use ndarray::{s, Array2, ArrayView1, Axis};

/// Mapping from intensity label to `[events, width]` response matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Responses {
    by_intensity: BTreeMap<String, Array2<f64>>,
}

impl Responses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event row under `label`.
    ///
    /// When the existing matrix is wider or narrower than `row`, both are
    /// cut to the shorter width first.
    pub fn push_row(&mut self, label: &str, row: ArrayView1<f64>) {
        let row = row.insert_axis(Axis(0));
        self.append(label, row.to_owned());
    }

    /// Concatenate every matrix of `other` under the same labels.
    pub fn merge(&mut self, other: &Responses) {
        for (label, block) in &other.by_intensity {
            self.append(label, block.clone());
        }
    }

    /// Drop trailing columns so no matrix is wider than `width`.
    pub fn truncate(&mut self, width: usize) {
        for block in self.by_intensity.values_mut() {
            if block.ncols() > width {
                *block = block.slice(s![.., ..width]).to_owned();
            }
        }
    }

    /// Narrowest matrix, or `None` when empty.
    pub fn min_width(&self) -> Option<usize> {
        self.by_intensity.values().map(|b| b.ncols()).min()
    }

    pub fn get(&self, label: &str) -> Option<&Array2<f64>> {
        self.by_intensity.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Array2<f64>> {
        self.by_intensity.get_mut(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_intensity.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Array2<f64>> {
        self.by_intensity.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Array2<f64>> {
        self.by_intensity.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.by_intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_intensity.is_empty()
    }

    /// Total event rows over all intensities.
    pub fn n_events(&self) -> usize {
        self.by_intensity.values().map(|b| b.nrows()).sum()
    }

    fn append(&mut self, label: &str, block: Array2<f64>) {
        match self.by_intensity.get_mut(label) {
            None => {
                self.by_intensity.insert(label.to_string(), block);
            }
            Some(existing) => {
                let width = existing.ncols().min(block.ncols());
                let mut joined = Array2::<f64>::zeros((existing.nrows() + block.nrows(), width));
                joined
                    .slice_mut(s![..existing.nrows(), ..])
                    .assign(&existing.slice(s![.., ..width]));
                joined
                    .slice_mut(s![existing.nrows().., ..])
                    .assign(&block.slice(s![.., ..width]));
                *existing = joined;
            }
        }
    }
}

impl<'a> IntoIterator for &'a Responses {
    type Item = (&'a String, &'a Array2<f64>);
    type IntoIter = btree_map::Iter<'a, String, Array2<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
