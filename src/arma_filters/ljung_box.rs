use nalgebra::{DMatrix, DVector};

use crate::arma_filters::{check_apply, residuals, ArmaFilter};
use crate::error::Result;
use crate::matrix::symmetric::{lcholesky, xtx, CHOLESKY_EPSILON};
use crate::matrix::triangular::{lsolve, rsolve};
use crate::model::ArmaModel;

/// Exact likelihood by pre-sample augmentation (Ljung and Box, 1979).
///
/// The `p` pre-sample observations and `q` pre-sample innovations form
/// `u = sigma R z`, `z ~ N(0, I)`, with `R R' = Cov(u) / sigma^2`. The
/// residuals are affine in `u`: `e = e0 + D u`. With `H = D R` and
/// `M = I + H'H`, the output is `[z^, e0 / sigma + H z^]`, `z^ = -M^{-1} H' e0 / sigma`,
/// and `ln |Cov(y)| = n ln sigma^2 + ln |M|`.
#[derive(Debug, Clone, Default)]
pub struct LjungBoxFilter {
    prepared: Option<Prepared>,
}

#[derive(Debug, Clone)]
struct Prepared {
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma: f64,
    n: usize,
    /// `H = D R`, n x (p + q)
    h: DMatrix<f64>,
    /// Cholesky factor of `M`
    m: DMatrix<f64>,
    logdet: f64,
}

/// `Cov(u) / sigma^2` for `u = [y_{-1}..y_{-p}, e_{-1}..e_{-q}]`.
fn pre_sample_covariance(model: &ArmaModel, p: usize, q: usize) -> Result<DMatrix<f64>> {
    let var = model.var;
    let gamma = model.autocovariances(p.max(1))?;
    let psi = model.psi_weights(q.max(1));
    let mut omega = DMatrix::zeros(p + q, p + q);
    for a in 0..p {
        for b in 0..p {
            omega[(a, b)] = gamma[a.abs_diff(b)] / var;
        }
        // Cov(y_{-a-1}, e_{-b-1}) = var psi_{b-a}
        for b in a..q {
            omega[(a, p + b)] = psi[b - a];
            omega[(p + b, a)] = psi[b - a];
        }
    }
    for b in 0..q {
        omega[(p + b, p + b)] = 1.0;
    }
    Ok(omega)
}

/// Response of the residual recursion to each unit pre-sample value.
pub(crate) fn pre_sample_response(
    ar: &[f64],
    ma: &[f64],
    n: usize,
    start: usize,
    np: usize,
    nq: usize,
) -> DMatrix<f64> {
    let zeros = vec![0.0; n];
    let mut d = DMatrix::zeros(n - start.min(n), np + nq);
    for c in 0..np + nq {
        let mut pre_y = vec![0.0; np];
        let mut pre_e = vec![0.0; nq];
        if c < np {
            pre_y[c] = 1.0;
        } else {
            pre_e[c - np] = 1.0;
        }
        let e = residuals(ar, ma, &zeros, start, &pre_y, &pre_e);
        d.set_column(c, &DVector::from_vec(e));
    }
    d
}

/// `M = I + H'H` factored in place; returns `ln |M|`.
pub(crate) fn factor_augmented(h: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let mut m = xtx(h);
    for i in 0..m.nrows() {
        m[(i, i)] += 1.0;
    }
    lcholesky(&mut m, CHOLESKY_EPSILON);
    let logdet = (0..m.nrows())
        .map(|i| m[(i, i)])
        .filter(|&d| d > 0.0)
        .map(|d| 2.0 * d.ln())
        .sum();
    (m, logdet)
}

/// Writes `[z^, e + H z^]` with `z^ = -M^{-1} H' e`.
pub(crate) fn augmented_residuals(h: &DMatrix<f64>, m: &DMatrix<f64>, e: &[f64], out: &mut [f64]) {
    let k = h.ncols();
    let e = DVector::from_column_slice(e);
    let mut z = -h.tr_mul(&e);
    lsolve(m, &mut z);
    rsolve(m, &mut z);
    let fitted = &e + h * &z;
    out[..k].copy_from_slice(z.as_slice());
    out[k..].copy_from_slice(fitted.as_slice());
}

impl ArmaFilter for LjungBoxFilter {
    fn prepare(&mut self, model: &ArmaModel, n: usize) -> Result<usize> {
        let (p, q) = (model.p(), model.q());
        let mut r = pre_sample_covariance(model, p, q)?;
        lcholesky(&mut r, CHOLESKY_EPSILON);
        let ar = model.ar[..=p].to_vec();
        let ma = model.ma[..=q].to_vec();
        let h = pre_sample_response(&ar, &ma, n, 0, p, q) * r;
        let (m, logdet_m) = factor_augmented(&h);
        self.prepared = Some(Prepared {
            ar,
            ma,
            sigma: model.var.sqrt(),
            n,
            h,
            m,
            logdet: n as f64 * model.var.ln() + logdet_m,
        });
        Ok(n + p + q)
    }

    fn apply(&self, y: &[f64], out: &mut [f64]) -> Result<()> {
        check_apply(self.prepared.as_ref().map(|s| (s.n, s.n + s.h.ncols())), y, out)?;
        let Some(s) = &self.prepared else {
            return Ok(());
        };
        let mut e0 = residuals(&s.ar, &s.ma, y, 0, &[], &[]);
        for e in e0.iter_mut() {
            *e /= s.sigma;
        }
        augmented_residuals(&s.h, &s.m, &e0, out);
        Ok(())
    }

    fn log_determinant(&self) -> f64 {
        self.prepared.as_ref().map_or(0.0, |s| s.logdet)
    }
}
