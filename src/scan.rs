//! 4-D functional scans.
//!
//! A [`Scan`] is the `[X, Y, Z, T]` voxel array of one session together with
//! the voxel → world affine and the voxel spacing read from the file header.
//! It is immutable once built; every construction draws a fresh identity so
//! cached results can tell two loads of the same path apart.
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{Matrix4, Vector4};
use ndarray::{Array4, ArrayD, Ix4};

use crate::error::{ResponseError, Result};

static NEXT_SCAN_ID: AtomicU64 = AtomicU64::new(1);

/// A loaded 4-D scan.
#[derive(Debug, Clone)]
pub struct Scan {
    data: Array4<f64>,
    affine: Matrix4<f64>,
    voxel_spacing: [f64; 3],
    tr: Option<f64>,
    id: u64,
}

impl Scan {
    /// Wrap a `[X, Y, Z, T]` array with an identity affine and unit spacing.
    pub fn new(data: Array4<f64>) -> Self {
        Self::with_geometry(data, Matrix4::identity(), [1.0, 1.0, 1.0])
    }

    /// Wrap a `[X, Y, Z, T]` array with explicit header geometry.
    pub fn with_geometry(data: Array4<f64>, affine: Matrix4<f64>, voxel_spacing: [f64; 3]) -> Self {
        Self {
            data,
            affine,
            voxel_spacing,
            tr: None,
            id: NEXT_SCAN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Build from a dynamically shaped array, rejecting anything but 4-D.
    pub fn from_dyn(data: ArrayD<f64>, affine: Matrix4<f64>, voxel_spacing: [f64; 3]) -> Result<Self> {
        let ndim = data.ndim();
        let data = data
            .into_dimensionality::<Ix4>()
            .map_err(|_| ResponseError::Dimensionality { expected: 4, found: ndim })?;
        Ok(Self::with_geometry(data, affine, voxel_spacing))
    }

    /// Attach the repetition time found in the file header.
    pub fn with_tr(mut self, tr: f64) -> Self {
        self.tr = (tr.is_finite() && tr > 0.0).then_some(tr);
        self
    }

    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    pub fn voxel_spacing(&self) -> [f64; 3] {
        self.voxel_spacing
    }

    /// Repetition time from the header, if the file carried one.
    pub fn tr(&self) -> Option<f64> {
        self.tr
    }

    /// Identity of this load; distinct for every constructed scan.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `[X, Y, Z]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (x, y, z, _) = self.data.dim();
        [x, y, z]
    }

    /// Number of time frames `T`.
    pub fn n_frames(&self) -> usize {
        self.data.dim().3
    }

    /// Mean over all four dimensions, restricted to nonzero voxels.
    ///
    /// Returns `0.0` for an all-zero scan.
    pub fn nonzero_mean(&self) -> f64 {
        let (sum, n) = self
            .data
            .iter()
            .filter(|&&v| v != 0.0)
            .fold((0.0_f64, 0usize), |(s, n), &v| (s + v, n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    }

    /// Map a physical (world) coordinate to fractional voxel indices.
    pub fn world_to_voxel(&self, world: [f64; 3]) -> Result<[f64; 3]> {
        let inv = self.affine.try_inverse().ok_or_else(|| {
            ResponseError::Config("scan affine is singular and cannot be inverted".into())
        })?;
        let v = inv * Vector4::new(world[0], world[1], world[2], 1.0);
        Ok([v[0], v[1], v[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, IxDyn};

    #[test]
    fn rejects_non_4d_volume() {
        let data = ArrayD::<f64>::zeros(IxDyn(&[4, 4, 4]));
        let err = Scan::from_dyn(data, Matrix4::identity(), [1.0; 3]).unwrap_err();
        assert!(matches!(err, ResponseError::Dimensionality { expected: 4, found: 3 }));
    }

    #[test]
    fn nonzero_mean_ignores_background() {
        let mut data = Array4::<f64>::zeros((2, 2, 1, 2));
        data[[0, 0, 0, 0]] = 2.0;
        data[[1, 1, 0, 1]] = 4.0;
        let scan = Scan::new(data);
        approx::assert_abs_diff_eq!(scan.nonzero_mean(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn world_to_voxel_inverts_scaling_and_offset() {
        let mut affine = Matrix4::<f64>::identity();
        affine[(0, 0)] = 2.0;
        affine[(1, 1)] = 2.0;
        affine[(2, 2)] = 3.0;
        affine[(0, 3)] = -10.0;
        let scan = Scan::with_geometry(Array4::zeros((8, 8, 8, 1)), affine, [2.0, 2.0, 3.0]);
        let v = scan.world_to_voxel([-4.0, 6.0, 9.0]).unwrap();
        approx::assert_abs_diff_eq!(v[0], 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v[1], 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(v[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn every_scan_gets_a_fresh_id() {
        let a = Scan::new(Array4::zeros((1, 1, 1, 1)));
        let b = a.clone();
        let c = Scan::new(Array4::zeros((1, 1, 1, 1)));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }
}
