use nalgebra::{DMatrix, DVector};

use crate::arma_filters::ljung_box::{augmented_residuals, factor_augmented, pre_sample_response};
use crate::arma_filters::{check_apply, residuals, ArmaFilter};
use crate::error::Result;
use crate::matrix::symmetric::{lcholesky, xtx, CHOLESKY_EPSILON};
use crate::matrix::triangular::{lsolve, lsolve_matrix};
use crate::model::ArmaModel;

/// Ljung-Box variant where the first `p` observations are handled exactly
/// through their own covariance `G = Gamma_p / sigma^2`, so only the `q`
/// pre-sample innovations `e_{p-1}..e_{p-q}` are augmented. Given the first
/// observations these have mean `C' G^{-1} y_{0:p}` and covariance
/// `sigma^2 (I - C' G^{-1} C)`, `C[s, b-1] = psi_{s-p+b}`.
///
/// Output: `[Lp^{-1} y_{0:p} / sigma, z^, e1 / sigma + H z^]`, length `n + q`
/// (just `n` when `n <= p`).
#[derive(Debug, Clone, Default)]
pub struct ModifiedLjungBoxFilter {
    prepared: Option<Prepared>,
}

#[derive(Debug, Clone)]
struct Prepared {
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma: f64,
    n: usize,
    p: usize,
    /// Cholesky factor of `G`
    lp: DMatrix<f64>,
    /// `Lp^{-1} C`
    w: DMatrix<f64>,
    /// Response of the residuals to the pre-sample innovations.
    d: DMatrix<f64>,
    h: DMatrix<f64>,
    m: DMatrix<f64>,
    logdet: f64,
}

impl ArmaFilter for ModifiedLjungBoxFilter {
    fn prepare(&mut self, model: &ArmaModel, n: usize) -> Result<usize> {
        let (p, q) = (model.p(), model.q());
        let var = model.var;
        let head = p.min(n);
        let k = if n > p { q } else { 0 };

        let gamma = model.autocovariances(p.max(1))?;
        let mut lp = DMatrix::from_fn(head, head, |i, j| gamma[i.abs_diff(j)] / var);
        lcholesky(&mut lp, CHOLESKY_EPSILON);
        let logdet_g: f64 = (0..head)
            .map(|i| lp[(i, i)])
            .filter(|&d| d > 0.0)
            .map(|d| 2.0 * d.ln())
            .sum();

        let psi = model.psi_weights(q.max(1));
        let mut w = DMatrix::from_fn(head, k, |s, b| {
            // b is zero-based: psi_{s - p + b + 1}
            (s + b + 1).checked_sub(p).map_or(0.0, |i| psi[i])
        });
        lsolve_matrix(&lp, &mut w);
        let mut r = -xtx(&w);
        for i in 0..k {
            r[(i, i)] += 1.0;
        }
        lcholesky(&mut r, CHOLESKY_EPSILON);

        let ar = model.ar[..=p].to_vec();
        let ma = model.ma[..=q].to_vec();
        let d = pre_sample_response(&ar, &ma, n, head, 0, k);
        let h = &d * r;
        let (m, logdet_m) = factor_augmented(&h);
        self.prepared = Some(Prepared {
            ar,
            ma,
            sigma: var.sqrt(),
            n,
            p: head,
            lp,
            w,
            d,
            h,
            m,
            logdet: n as f64 * var.ln() + logdet_g + logdet_m,
        });
        Ok(n + k)
    }

    fn apply(&self, y: &[f64], out: &mut [f64]) -> Result<()> {
        check_apply(self.prepared.as_ref().map(|s| (s.n, s.n + s.h.ncols())), y, out)?;
        let Some(s) = &self.prepared else {
            return Ok(());
        };
        let p = s.p;
        let mut w = DVector::from_column_slice(&y[..p]);
        lsolve(&s.lp, &mut w);
        w /= s.sigma;
        out[..p].copy_from_slice(w.as_slice());
        if s.n == p {
            return Ok(());
        }

        let mu = s.w.tr_mul(&w) * s.sigma;
        let pre_y: Vec<f64> = (1..=p).map(|a| y[p - a]).collect();
        let e0 = DVector::from_vec(residuals(&s.ar, &s.ma, y, p, &pre_y, &[]));
        let e1 = (e0 + &s.d * mu) / s.sigma;
        augmented_residuals(&s.h, &s.m, e1.as_slice(), &mut out[p..]);
        Ok(())
    }

    fn log_determinant(&self) -> f64 {
        self.prepared.as_ref().map_or(0.0, |s| s.logdet)
    }
}
