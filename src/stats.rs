//! Per-column statistics over response matrices.
//!
//! Each column (time point) is reduced over the event rows that hold a
//! valid sample. Which samples count as missing is an explicit
//! [`MissingData`] choice:
//!
//! ```text
//! mean = Σ v / n
//! std  = sqrt( Σ (v − mean)² / (n − 1) )      ddof = 1
//! sem  = std / sqrt(n)
//! ```
//!
//! A column without valid samples gives `NaN`; so do `std` / `sem` with
//! fewer than two samples.
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Which samples the column statistics skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingData {
    /// `NaN` marks a missing sample; zeros are real values.
    #[default]
    NanIsMissing,
    /// Every exact `0.0` (and `NaN`) is treated as missing.
    ZeroIsMissing,
}

impl MissingData {
    #[inline]
    pub fn is_valid(self, v: f64) -> bool {
        match self {
            Self::NanIsMissing => !v.is_nan(),
            Self::ZeroIsMissing => !v.is_nan() && v != 0.0,
        }
    }
}

/// Column means over valid samples.
pub fn column_mean(block: &Array2<f64>, missing: MissingData) -> Array1<f64> {
    reduce_columns(block, |col| {
        let (sum, n) = valid_sum(col, missing);
        if n == 0 { f64::NAN } else { sum / n as f64 }
    })
}

/// Column sample standard deviations (`ddof = 1`).
pub fn column_std(block: &Array2<f64>, missing: MissingData) -> Array1<f64> {
    reduce_columns(block, |col| std_and_count(col, missing).0)
}

/// Column standard errors of the mean, `std / sqrt(n)`.
pub fn column_sem(block: &Array2<f64>, missing: MissingData) -> Array1<f64> {
    reduce_columns(block, |col| {
        let (std, n) = std_and_count(col, missing);
        std / (n as f64).sqrt()
    })
}

/// Valid samples per column.
pub fn column_count(block: &Array2<f64>, missing: MissingData) -> Array1<usize> {
    block
        .axis_iter(Axis(1))
        .map(|col| col.iter().filter(|&&v| missing.is_valid(v)).count())
        .collect()
}

fn reduce_columns(block: &Array2<f64>, f: impl Fn(ArrayView1<f64>) -> f64) -> Array1<f64> {
    block.axis_iter(Axis(1)).map(f).collect()
}

fn valid_sum(col: ArrayView1<f64>, missing: MissingData) -> (f64, usize) {
    col.iter()
        .filter(|&&v| missing.is_valid(v))
        .fold((0.0, 0), |(s, n), &v| (s + v, n + 1))
}

fn std_and_count(col: ArrayView1<f64>, missing: MissingData) -> (f64, usize) {
    let (sum, n) = valid_sum(col, missing);
    if n < 2 {
        return (f64::NAN, n);
    }
    let mean = sum / n as f64;
    let ss: f64 = col
        .iter()
        .filter(|&&v| missing.is_valid(v))
        .map(|&v| (v - mean) * (v - mean))
        .sum();
    ((ss / (n - 1) as f64).sqrt(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mean_std_sem_with_bessel_correction() {
        let block = array![[1.0, 2.0], [3.0, 2.0], [5.0, 2.0]];
        let mean = column_mean(&block, MissingData::NanIsMissing);
        let std = column_std(&block, MissingData::NanIsMissing);
        let sem = column_sem(&block, MissingData::NanIsMissing);
        approx::assert_abs_diff_eq!(mean[0], 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(std[0], 2.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(sem[0], 2.0 / 3.0_f64.sqrt(), epsilon = 1e-12);
        approx::assert_abs_diff_eq!(std[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zeros_count_unless_asked_otherwise() {
        let block = array![[0.0], [4.0]];
        approx::assert_abs_diff_eq!(column_mean(&block, MissingData::NanIsMissing)[0], 2.0);
        approx::assert_abs_diff_eq!(column_mean(&block, MissingData::ZeroIsMissing)[0], 4.0);
        assert_eq!(column_count(&block, MissingData::ZeroIsMissing)[0], 1);
    }

    #[test]
    fn nan_marks_missing_samples() {
        let block = array![[f64::NAN, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let mean = column_mean(&block, MissingData::NanIsMissing);
        approx::assert_abs_diff_eq!(mean[0], 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(mean[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn single_sample_has_no_spread() {
        let block = array![[7.0]];
        assert!(column_std(&block, MissingData::NanIsMissing)[0].is_nan());
        assert!(column_sem(&block, MissingData::NanIsMissing)[0].is_nan());
        approx::assert_abs_diff_eq!(column_mean(&block, MissingData::NanIsMissing)[0], 7.0);
    }
}
