//! Writing summaries for downstream tools.
//!
//! * [`export_safetensors`]: one tensor per intensity and statistic
//!   (`mean_<label>`, `sem_<label>`, `std_<label>`), or with
//!   [`Layout::Combined`] a single `[n_intensities, 1 + width]` `means`
//!   array whose first column holds the intensity value.
//! * [`export_text`]: a tab-separated table with one row per intensity:
//!   label, event count, FWHM crossings, peak, then the mean curve.
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::summary::Summary;

/// Safetensors tensor arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    PerIntensity,
    Combined,
}

/// Minimal safetensors writer for F64 tensors.
///
/// ```rust,no_run
/// use fmri_response::export::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("mean_1", &[1.0, 2.0, 3.0], &[1, 3]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, shape.to_vec()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": "F64",
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

/// Write `summaries` to a safetensors file.
pub fn export_safetensors(summaries: &BTreeMap<String, Summary>, path: &Path, layout: Layout) -> Result<()> {
    let mut w = StWriter::new();
    match layout {
        Layout::PerIntensity => {
            for (label, s) in summaries {
                let width = s.mean.len();
                w.add_f64(&format!("mean_{label}"), &s.mean.to_vec(), &[1, width]);
                w.add_f64(&format!("sem_{label}"), &s.sem.to_vec(), &[1, width]);
                w.add_f64(&format!("std_{label}"), &s.std.to_vec(), &[1, width]);
            }
        }
        Layout::Combined => {
            let Some(width) = summaries.values().map(|s| s.mean.len()).min() else {
                bail!("nothing to export");
            };
            let mut data = Vec::with_capacity(summaries.len() * (width + 1));
            for (label, s) in summaries {
                let intensity: f64 = label
                    .parse()
                    .with_context(|| format!("intensity label '{label}' is not numeric"))?;
                data.push(intensity);
                data.extend(s.mean.iter().take(width));
            }
            w.add_f64("means", &data, &[summaries.len(), width + 1]);
        }
    }
    w.write(path)
}

/// Write `summaries` as a tab-separated text table.
pub fn export_text(summaries: &BTreeMap<String, Summary>, path: &Path) -> Result<()> {
    let mut f = std::io::BufWriter::new(
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    writeln!(f, "# intensity\tevents\tfwhm_left\tfwhm_right\tpeak_index\tpeak\tmean...")?;
    for (label, s) in summaries {
        let (fl, fr) = s.fwhm.map_or((f64::NAN, f64::NAN), |w| (w.left, w.right));
        let (pi, pv) = s.amplitude.map_or((String::from("nan"), f64::NAN), |a| (a.index.to_string(), a.value));
        write!(f, "{label}\t{}\t{fl}\t{fr}\t{pi}\t{pv}", s.events)?;
        for v in s.mean.iter() {
            write!(f, "\t{v}")?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}
