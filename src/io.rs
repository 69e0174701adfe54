//! Reading scans, masks and stimulus tables from disk.
//!
//! * Scans and masks: NIfTI-1 (`.nii`, `.nii.gz`) through the `nifti` crate.
//! * Stimulus tables: a safetensors file with an `[N, 2]` tensor named
//!   `stimuli` (F32 or F64), or a plain-text table of
//!   `onset_seconds  intensity` rows separated by whitespace or commas.
//!
//! All readers return typed [`ResponseError`]s so the caller can tell a
//! missing file from a malformed one.
use std::collections::HashMap;
use std::path::Path;

use nalgebra::Matrix4;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::{ResponseError, Result};
use crate::mask::Mask;
use crate::scan::Scan;
use crate::stimuli::StimulusTable;

/// Read a 4-D NIfTI scan.
///
/// The TR in `pixdim[4]` is attached to the scan when present.
pub fn read_scan(path: &Path) -> Result<Scan> {
    let (header, data) = read_volume(path)?;
    let affine = affine_from_header(&header);
    let spacing = [header.pixdim[1] as f64, header.pixdim[2] as f64, header.pixdim[3] as f64];
    let scan = Scan::from_dyn(data, affine, spacing)?.with_tr(header.pixdim[4] as f64);
    tracing::debug!(path = %path.display(), shape = ?scan.data().dim(), "read scan");
    Ok(scan)
}

/// Read a 3-D NIfTI mask.
pub fn read_mask(path: &Path) -> Result<Mask> {
    let (_, data) = read_volume(path)?;
    Mask::from_dyn(data)
}

/// Read a stimulus table; the format is picked by file extension.
pub fn read_stimuli(path: &Path, tr: f64) -> Result<StimulusTable> {
    let bytes = std::fs::read(path).map_err(|e| ResponseError::io(path, e))?;
    let rows = if path.extension().and_then(|e| e.to_str()) == Some("safetensors") {
        parse_safetensors_rows(&bytes)?
    } else {
        let text = String::from_utf8(bytes)
            .map_err(|_| ResponseError::InvalidStimuli(format!("{} is not UTF-8 text", path.display())))?;
        parse_text_rows(&text)?
    };
    StimulusTable::from_rows(&rows, tr)
}

fn read_volume(path: &Path) -> Result<(NiftiHeader, ndarray::ArrayD<f64>)> {
    if !path.exists() {
        return Err(ResponseError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }
    let nifti_err = |e: nifti::NiftiError| ResponseError::Nifti {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let obj = ReaderOptions::new().read_file(path).map_err(nifti_err)?;
    let header = obj.header().clone();
    let data = obj.into_volume().into_ndarray::<f64>().map_err(nifti_err)?;
    Ok((header, data))
}

/// Voxel → world affine: sform when set, else qform, else voxel scaling.
pub fn affine_from_header(h: &NiftiHeader) -> Matrix4<f64> {
    if h.sform_code > 0 {
        let (x, y, z) = (h.srow_x, h.srow_y, h.srow_z);
        return Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        );
    }
    let (dx, dy, dz) = (h.pixdim[1] as f64, h.pixdim[2] as f64, h.pixdim[3] as f64);
    if h.qform_code > 0 {
        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        return Matrix4::new(
            (a * a + b * b - c * c - d * d) * dx, 2.0 * (b * c - a * d) * dy, 2.0 * (b * d + a * c) * dz, h.quatern_x as f64,
            2.0 * (b * c + a * d) * dx, (a * a + c * c - b * b - d * d) * dy, 2.0 * (c * d - a * b) * dz, h.quatern_y as f64,
            2.0 * (b * d - a * c) * dx, 2.0 * (c * d + a * b) * dy, (a * a + d * d - b * b - c * c) * dz, h.quatern_z as f64,
            0.0, 0.0, 0.0, 1.0,
        );
    }
    Matrix4::new(
        dx, 0.0, 0.0, 0.0,
        0.0, dy, 0.0, 0.0,
        0.0, 0.0, dz, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

// ── Stimulus table parsers ──────────────────────────────────────────────────

/// `onset intensity` rows; blank lines and `#` comments are skipped.
pub fn parse_text_rows(text: &str) -> Result<Vec<[f64; 2]>> {
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let parse = |f: &str| {
            f.parse::<f64>().map_err(|_| {
                ResponseError::InvalidStimuli(format!("line {}: '{f}' is not a number", lineno + 1))
            })
        };
        match fields.as_slice() {
            [onset, intensity] => rows.push([parse(*onset)?, parse(*intensity)?]),
            _ => {
                return Err(ResponseError::InvalidStimuli(format!(
                    "line {}: expected 2 columns, found {}",
                    lineno + 1,
                    fields.len()
                )))
            }
        }
    }
    Ok(rows)
}

/// The `stimuli` tensor (or the only tensor) of a safetensors file.
pub fn parse_safetensors_rows(bytes: &[u8]) -> Result<Vec<[f64; 2]>> {
    let bad = |msg: &str| ResponseError::InvalidStimuli(format!("safetensors: {msg}"));

    if bytes.len() < 8 {
        return Err(bad("file too small"));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    let data_start = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).ok_or_else(|| bad("truncated header"))?;
    let header: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..data_start]).map_err(|e| bad(&e.to_string()))?;

    let tensors: Vec<(&String, &serde_json::Value)> =
        header.iter().filter(|(k, _)| k.as_str() != "__metadata__").collect();
    let entry = match header.get("stimuli") {
        Some(e) => e,
        None if tensors.len() == 1 => tensors[0].1,
        None => return Err(bad("no 'stimuli' tensor")),
    };

    let shape: Vec<usize> = entry["shape"]
        .as_array()
        .ok_or_else(|| bad("missing shape"))?
        .iter()
        .map(|v| v.as_u64().map(|v| v as usize))
        .collect::<Option<_>>()
        .ok_or_else(|| bad("malformed shape"))?;
    if shape.len() != 2 || shape[1] != 2 {
        return Err(bad(&format!("expected an [N, 2] tensor, got {shape:?}")));
    }

    let offsets = entry["data_offsets"].as_array().ok_or_else(|| bad("missing data_offsets"))?;
    let (s, e) = match (offsets.first().and_then(|v| v.as_u64()), offsets.get(1).and_then(|v| v.as_u64())) {
        (Some(s), Some(e)) => (data_start + s as usize, data_start + e as usize),
        _ => return Err(bad("malformed data_offsets")),
    };
    let raw = bytes.get(s..e).ok_or_else(|| bad("data_offsets out of range"))?;

    let values: Vec<f64> = match entry["dtype"].as_str() {
        Some("F64") => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        Some("F32") => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        other => return Err(bad(&format!("unsupported dtype {other:?}"))),
    };
    if values.len() != shape[0] * 2 {
        return Err(bad("tensor byte length does not match its shape"));
    }
    Ok(values.chunks_exact(2).map(|p| [p[0], p[1]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rows_accept_commas_and_comments() {
        let text = "# onset intensity\n2.0, 1\n\n 10.5\t2 # loud\n";
        let rows = parse_text_rows(text).unwrap();
        assert_eq!(rows, vec![[2.0, 1.0], [10.5, 2.0]]);
    }

    #[test]
    fn text_rows_reject_wrong_column_count() {
        let err = parse_text_rows("1 2 3\n").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidStimuli(_)));
    }

    #[test]
    fn missing_scan_is_an_io_error() {
        let err = read_scan(Path::new("/definitely/not/here.nii")).unwrap_err();
        assert!(matches!(err, ResponseError::Io { .. }));
    }

    #[test]
    fn identity_header_gives_voxel_scaling() {
        let mut h = NiftiHeader::default();
        h.pixdim = [1.0, 2.0, 3.0, 4.0, 1.5, 0.0, 0.0, 0.0];
        h.sform_code = 0;
        h.qform_code = 0;
        let a = affine_from_header(&h);
        assert_eq!(a[(0, 0)], 2.0);
        assert_eq!(a[(1, 1)], 3.0);
        assert_eq!(a[(2, 2)], 4.0);
        assert_eq!(a[(0, 3)], 0.0);
    }
}
