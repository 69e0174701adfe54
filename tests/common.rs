/// Shared builders for synthetic scans, masks and stimulus tables.
use fmri_response::{Entity, Mask, Scan, StimulusTable};
use ndarray::{Array3, Array4};
use std::path::{Path, PathBuf};

pub const SHAPE: [usize; 3] = [4, 4, 3];

#[allow(unused)]
/// Scan whose voxels inside `roi` follow `signal(t)` and whose other
/// voxels hold `background`.
pub fn scan_with_signal(roi: &Mask, n_frames: usize, background: f64, signal: impl Fn(usize) -> f64) -> Scan {
    let [x, y, z] = roi.shape();
    let w = roi.weights();
    let data = Array4::from_shape_fn((x, y, z, n_frames), |(i, j, k, t)| {
        if w[[i, j, k]] != 0.0 { signal(t) } else { background }
    });
    Scan::new(data)
}

#[allow(unused)]
/// Binary mask over [`SHAPE`] selecting the 2×2×1 block at the origin.
pub fn corner_mask() -> Mask {
    let mut w = Array3::<f64>::zeros((SHAPE[0], SHAPE[1], SHAPE[2]));
    for i in 0..2 {
        for j in 0..2 {
            w[[i, j, 0]] = 1.0;
        }
    }
    Mask::new(w)
}

#[allow(unused)]
/// Table with TR = 1 s from `(onset, intensity)` pairs.
pub fn table(rows: &[[f64; 2]]) -> StimulusTable {
    StimulusTable::from_rows(rows, 1.0).unwrap()
}

#[allow(unused)]
/// Session whose masked series is `base + t` with the corner mask and the
/// given table attached locally.
pub fn ready_session(name: &str, n_frames: usize, rows: &[[f64; 2]]) -> Entity {
    let mask = corner_mask();
    let scan = scan_with_signal(&mask, n_frames, 0.0, |t| 100.0 + t as f64);
    let mut s = Entity::session(name);
    s.load_mask(mask, None).unwrap();
    s.load_stimuli(table(rows), None).unwrap();
    s.load_scan(scan, None).unwrap();
    s
}

#[allow(unused)]
/// Write a volume as an uncompressed NIfTI-1 file.
pub fn write_nifti<D: ndarray::Dimension + ndarray::RemoveAxis>(
    dir: &Path,
    name: &str,
    data: &ndarray::Array<f32, D>,
) -> PathBuf {
    let path = dir.join(name);
    nifti::writer::WriterOptions::new(&path).write_nifti(data).unwrap();
    path
}

#[allow(unused)]
/// Write a text stimulus table.
pub fn write_onsets(dir: &Path, name: &str, rows: &[[f64; 2]]) -> PathBuf {
    let path = dir.join(name);
    let text: String = rows.iter().map(|[o, i]| format!("{o}\t{i}\n")).collect();
    std::fs::write(&path, format!("# onset\tintensity\n{text}")).unwrap();
    path
}

#[allow(unused)]
/// Maximum absolute difference between two slices.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}
