//! Least-squares smoothing cubic splines.
//!
//! [`SmoothingSpline::fit`] looks for the cubic B-spline with the fewest
//! interior knots whose residual sum of squares stays within the smoothing
//! budget `s`:
//!
//! ```text
//! Σ (y_i − g(x_i))²  ≤  s
//! ```
//!
//! It starts from a single cubic polynomial (end knots of multiplicity 4, no
//! interior knots) and inserts one knot per round, at the data site in the
//! middle of the knot interval carrying the largest residual, until the
//! budget is met or every data site is interpolated. Coefficients come from
//! an SVD least-squares solve so rank-deficient knot layouts still fit.
//!
//! Data that a cubic fits within `s` is therefore reproduced by one
//! polynomial, which keeps peaks and half-maximum crossings of smooth
//! responses exact.
use nalgebra::{DMatrix, DVector, Matrix4, Vector4};

use crate::error::{ResponseError, Result};

const DEGREE: usize = 3;
const ORDER: usize = DEGREE + 1;
const BISECT_ITERS: usize = 100;

/// A fitted cubic spline on `[x_0, x_{n−1}]`.
#[derive(Debug, Clone)]
pub struct SmoothingSpline {
    /// Full knot vector, end knots repeated `ORDER` times.
    knots: Vec<f64>,
    coeffs: Vec<f64>,
    residual: f64,
}

impl SmoothingSpline {
    /// Fit `y` over strictly increasing `x` with residual budget `smoothing`.
    ///
    /// # Errors
    ///
    /// [`ResponseError::SplineFit`] for mismatched lengths, fewer than four
    /// points, non-finite values, unsorted `x` or a negative budget.
    pub fn fit(x: &[f64], y: &[f64], smoothing: f64) -> Result<Self> {
        validate(x, y, smoothing)?;
        let n = x.len();
        let (a, b) = (x[0], x[n - 1]);

        let mut interior: Vec<f64> = Vec::new();
        loop {
            let knots = knot_vector(a, b, &interior);
            let coeffs = least_squares(&knots, x, y)?;
            let mut spline = Self { knots, coeffs, residual: 0.0 };
            let residuals: Vec<f64> = x.iter().zip(y).map(|(&xi, &yi)| yi - spline.eval(xi)).collect();
            spline.residual = residuals.iter().map(|r| r * r).sum();

            if spline.residual <= smoothing || interior.len() + ORDER >= n {
                tracing::trace!(
                    interior_knots = interior.len(),
                    residual = spline.residual,
                    "spline fitted"
                );
                return Ok(spline);
            }
            match next_knot(x, &residuals, a, b, &interior) {
                Some(k) => {
                    let pos = interior.partition_point(|&t| t < k);
                    interior.insert(pos, k);
                }
                None => return Ok(spline),
            }
        }
    }

    /// Evaluate at `x`; values outside the fitted range are extrapolated
    /// from the nearest end polynomial.
    pub fn eval(&self, x: f64) -> f64 {
        self.eval_in_span(self.span(x), x)
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }

    /// Residual sum of squares over the fitted data.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Knots strictly inside the fitted range.
    pub fn interior_knots(&self) -> &[f64] {
        &self.knots[ORDER..self.knots.len() - ORDER]
    }

    /// All zeros of the spline on its fitted range, ascending.
    ///
    /// Each knot interval holds one cubic; it is split at its critical
    /// points and every monotone piece with a sign change is bisected.
    /// Tangential zeros without a sign change are not reported.
    pub fn roots(&self) -> Vec<f64> {
        let mut roots = Vec::new();
        let breaks = self.breakpoints();
        for w in breaks.windows(2) {
            let (u0, u1) = (w[0], w[1]);
            let poly = self.local_cubic(u0, u1);
            let mut cuts = vec![0.0];
            cuts.extend(critical_points(&poly).into_iter().filter(|&s| s > 0.0 && s < 1.0));
            cuts.push(1.0);
            let zero = 1e-12 * poly.iter().fold(0.0_f64, |m, c| m.max(c.abs()));

            for piece in cuts.windows(2) {
                let (l, r) = (piece[0], piece[1]);
                let (pl, pr) = (horner(&poly, l), horner(&poly, r));
                if pl.abs() <= zero {
                    roots.push(u0 + l * (u1 - u0));
                } else if pr.abs() <= zero {
                    roots.push(u0 + r * (u1 - u0));
                } else if pl.signum() != pr.signum() {
                    roots.push(u0 + bisect(&poly, l, r, pl) * (u1 - u0));
                }
            }
        }

        roots.sort_by(f64::total_cmp);
        let tol = 1e-9 * (breaks[breaks.len() - 1] - breaks[0]).abs().max(1.0);
        roots.dedup_by(|b, a| (*b - *a).abs() <= tol);
        roots
    }

    fn breakpoints(&self) -> Vec<f64> {
        let mut b: Vec<f64> = self.knots[DEGREE..self.knots.len() - DEGREE].to_vec();
        b.dedup();
        b
    }

    fn eval_in_span(&self, span: usize, x: f64) -> f64 {
        basis_funs(span, x, &self.knots)
            .iter()
            .enumerate()
            .map(|(r, &nb)| nb * self.coeffs[span - DEGREE + r])
            .sum()
    }

    // Index of the knot span containing `x`, clamped to the fitted range.
    fn span(&self, x: f64) -> usize {
        let n_basis = self.coeffs.len();
        if x >= self.knots[n_basis] {
            return n_basis - 1;
        }
        if x <= self.knots[DEGREE] {
            return DEGREE;
        }
        // Last index with knots[i] <= x.
        self.knots.partition_point(|&t| t <= x) - 1
    }

    // Power-form coefficients of the piece on [u0, u1] in s = (x − u0) / (u1 − u0).
    fn local_cubic(&self, u0: f64, u1: f64) -> [f64; 4] {
        let h = u1 - u0;
        let nodes: [f64; 4] = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        // Stay inside the span so the end sample is not taken from the
        // neighbouring piece.
        let mid = u0 + 0.5 * h;
        let span = self.span(mid);
        let vander = Matrix4::from_fn(|i, j| nodes[i].powi(j as i32));
        let values = Vector4::from_fn(|i, _| self.eval_in_span(span, u0 + nodes[i] * h));
        match vander.lu().solve(&values) {
            Some(c) => [c[0], c[1], c[2], c[3]],
            None => [values[0], 0.0, 0.0, 0.0],
        }
    }
}

fn validate(x: &[f64], y: &[f64], smoothing: f64) -> Result<()> {
    if x.len() != y.len() {
        return Err(ResponseError::SplineFit(format!(
            "x has {} points but y has {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < ORDER {
        return Err(ResponseError::SplineFit(format!(
            "a cubic spline needs at least {ORDER} points, got {}",
            x.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(ResponseError::SplineFit("input contains non-finite values".into()));
    }
    if x.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ResponseError::SplineFit("x must be strictly increasing".into()));
    }
    if !(smoothing >= 0.0) {
        return Err(ResponseError::SplineFit(format!("smoothing must be >= 0, got {smoothing}")));
    }
    Ok(())
}

fn knot_vector(a: f64, b: f64, interior: &[f64]) -> Vec<f64> {
    let mut t = Vec::with_capacity(interior.len() + 2 * ORDER);
    t.extend(std::iter::repeat(a).take(ORDER));
    t.extend_from_slice(interior);
    t.extend(std::iter::repeat(b).take(ORDER));
    t
}

fn least_squares(knots: &[f64], x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    let n_basis = knots.len() - ORDER;
    let probe = SmoothingSpline { knots: knots.to_vec(), coeffs: vec![0.0; n_basis], residual: 0.0 };
    let mut design = DMatrix::<f64>::zeros(x.len(), n_basis);
    for (i, &xi) in x.iter().enumerate() {
        let span = probe.span(xi);
        for (r, nb) in basis_funs(span, xi, knots).into_iter().enumerate() {
            design[(i, span - DEGREE + r)] = nb;
        }
    }
    let rhs = DVector::from_column_slice(y);
    design
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map(|c| c.iter().copied().collect())
        .map_err(|e| ResponseError::SplineFit(e.to_string()))
}

// The four nonzero cubic B-splines at `x` in `span` (de Boor / Cox recursion).
fn basis_funs(span: usize, x: f64, t: &[f64]) -> [f64; ORDER] {
    let mut n = [0.0; ORDER];
    let mut left = [0.0; ORDER];
    let mut right = [0.0; ORDER];
    n[0] = 1.0;
    for j in 1..=DEGREE {
        left[j] = x - t[span + 1 - j];
        right[j] = t[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}

// Data site nearest the middle of the knot interval with the largest
// squared residual that still holds a site strictly inside it.
fn next_knot(x: &[f64], residuals: &[f64], a: f64, b: f64, interior: &[f64]) -> Option<f64> {
    let mut bounds = Vec::with_capacity(interior.len() + 2);
    bounds.push(a);
    bounds.extend_from_slice(interior);
    bounds.push(b);

    bounds
        .windows(2)
        .filter_map(|w| {
            let inside: Vec<usize> = (0..x.len()).filter(|&i| x[i] > w[0] && x[i] < w[1]).collect();
            if inside.is_empty() {
                return None;
            }
            let load: f64 = (0..x.len())
                .filter(|&i| x[i] >= w[0] && x[i] <= w[1])
                .map(|i| residuals[i] * residuals[i])
                .sum();
            Some((load, x[inside[inside.len() / 2]]))
        })
        .max_by(|p, q| p.0.total_cmp(&q.0))
        .map(|(_, k)| k)
}

fn horner(c: &[f64; 4], s: f64) -> f64 {
    ((c[3] * s + c[2]) * s + c[1]) * s + c[0]
}

fn critical_points(c: &[f64; 4]) -> Vec<f64> {
    // p'(s) = 3 c3 s² + 2 c2 s + c1
    let (qa, qb, qc) = (3.0 * c[3], 2.0 * c[2], c[1]);
    let scale = qa.abs().max(qb.abs()).max(qc.abs());
    if scale == 0.0 {
        return vec![];
    }
    if qa.abs() <= 1e-14 * scale {
        if qb.abs() <= 1e-14 * scale {
            return vec![];
        }
        return vec![-qc / qb];
    }
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return vec![];
    }
    // Numerically stable quadratic roots.
    let q = -0.5 * (qb + qb.signum() * disc.sqrt());
    let mut out = vec![];
    if q != 0.0 {
        out.push(q / qa);
        out.push(qc / q);
    } else {
        out.push(0.0);
    }
    out.sort_by(f64::total_cmp);
    out
}

fn bisect(c: &[f64; 4], mut lo: f64, mut hi: f64, f_lo: f64) -> f64 {
    let sign_lo = f_lo.signum();
    for _ in 0..BISECT_ITERS {
        let mid = 0.5 * (lo + hi);
        let fm = horner(c, mid);
        if fm == 0.0 {
            return mid;
        }
        if fm.signum() == sign_lo {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}
