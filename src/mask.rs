//! Spatial regions of interest and masked time series.
//!
//! `apply_mask` collapses a `[X, Y, Z, T]` scan into a `[T]` series:
//!
//! ```text
//! series[t] = mean{ m·v  :  m·v ≠ 0 }   where m = mask[x,y,z], v = scan[x,y,z,t]
//! ```
//!
//! Masks are read from 3-D volumes or generated as a cube / sphere around a
//! centre voxel. World-space centres go through the scan's inverse affine
//! first.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ndarray::{Array1, Array3, ArrayD, Axis, Ix3, Zip};

use crate::error::{ResponseError, Result};
use crate::scan::Scan;

/// A 3-D boolean (0/1) or weighted region of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    weights: Array3<f64>,
    /// Content hash of `weights`, fixed at construction.
    hash: u64,
}

impl Mask {
    pub fn new(weights: Array3<f64>) -> Self {
        let hash = hash_weights(&weights);
        Self { weights, hash }
    }

    /// Build from a dynamically shaped array, rejecting anything but 3-D.
    ///
    /// A trailing singleton axis (`[X, Y, Z, 1]`, common for masks saved by
    /// other tools) is dropped.
    pub fn from_dyn(weights: ArrayD<f64>) -> Result<Self> {
        let weights = if weights.ndim() == 4 && weights.shape()[3] == 1 {
            weights.index_axis_move(Axis(3), 0)
        } else {
            weights
        };
        let ndim = weights.ndim();
        let weights = weights
            .into_dimensionality::<Ix3>()
            .map_err(|_| ResponseError::Dimensionality { expected: 3, found: ndim })?;
        Ok(Self::new(weights))
    }

    /// All voxels within `radius` of `center` along every axis.
    pub fn cube(shape: [usize; 3], center: [f64; 3], radius: f64) -> Self {
        Self::from_offsets(shape, center, |d| d.iter().all(|c| c.abs() <= radius))
    }

    /// All voxels whose Euclidean distance to `center` is at most `radius`.
    pub fn sphere(shape: [usize; 3], center: [f64; 3], radius: f64) -> Self {
        let r2 = radius * radius;
        Self::from_offsets(shape, center, |d| d.iter().map(|c| c * c).sum::<f64>() <= r2)
    }

    /// Cube around a world-space coordinate of `scan`; `radius` in voxels.
    pub fn cube_at_world(scan: &Scan, world: [f64; 3], radius: f64) -> Result<Self> {
        let center = scan.world_to_voxel(world)?;
        Ok(Self::cube(scan.spatial_shape(), center, radius))
    }

    /// Sphere around a world-space coordinate of `scan`; `radius` in voxels.
    pub fn sphere_at_world(scan: &Scan, world: [f64; 3], radius: f64) -> Result<Self> {
        let center = scan.world_to_voxel(world)?;
        Ok(Self::sphere(scan.spatial_shape(), center, radius))
    }

    pub fn weights(&self) -> &Array3<f64> {
        &self.weights
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.weights.dim();
        [x, y, z]
    }

    /// Number of voxels with a nonzero weight.
    pub fn support(&self) -> usize {
        self.weights.iter().filter(|&&w| w != 0.0).count()
    }

    /// Hash of shape and every weight's bit pattern.
    ///
    /// Two masks with equal content hash equally regardless of where they
    /// came from.
    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// Fail unless the mask covers exactly the scan's spatial grid.
    pub fn check_matches(&self, scan: &Scan) -> Result<()> {
        if self.shape() != scan.spatial_shape() {
            return Err(ResponseError::ShapeMismatch {
                mask: self.shape(),
                scan: scan.spatial_shape(),
            });
        }
        Ok(())
    }

    // `keep` sees the voxel's offset from `center`, in voxels.
    fn from_offsets(shape: [usize; 3], center: [f64; 3], keep: impl Fn([f64; 3]) -> bool) -> Self {
        let weights = Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(x, y, z)| {
            let d = [x as f64 - center[0], y as f64 - center[1], z as f64 - center[2]];
            if keep(d) { 1.0 } else { 0.0 }
        });
        Self::new(weights)
    }
}

fn hash_weights(weights: &Array3<f64>) -> u64 {
    let mut h = DefaultHasher::new();
    weights.dim().hash(&mut h);
    for w in weights.iter() {
        w.to_bits().hash(&mut h);
    }
    h.finish()
}

/// Average the masked scan over space, one value per time frame.
///
/// Frames in which the masked product has no nonzero element yield `0.0`.
///
/// # Errors
///
/// [`ResponseError::ShapeMismatch`] if the mask grid differs from the scan.
pub fn apply_mask(scan: &Scan, mask: &Mask) -> Result<Array1<f64>> {
    mask.check_matches(scan)?;

    let n_t = scan.n_frames();
    let mut series = Array1::<f64>::zeros(n_t);
    for (t, frame) in scan.data().axis_iter(Axis(3)).enumerate() {
        let mut sum = 0.0_f64;
        let mut n = 0usize;
        Zip::from(mask.weights()).and(&frame).for_each(|&m, &v| {
            let p = m * v;
            if p != 0.0 {
                sum += p;
                n += 1;
            }
        });
        series[t] = if n == 0 { 0.0 } else { sum / n as f64 };
    }
    tracing::debug!(frames = n_t, voxels = mask.support(), "applied mask");
    Ok(series)
}
