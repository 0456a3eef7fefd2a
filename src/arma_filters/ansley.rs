use crate::arma_filters::{check_apply, ArmaFilter};
use crate::error::Result;
use crate::matrix::band::{BandCholesky, SymmetricBandMatrix};
use crate::matrix::symmetric::CHOLESKY_EPSILON;
use crate::model::ArmaModel;

/// Ansley (1979): with `m = max(p, q)`, the transformed series
/// `w_t = y_t` (t < m), `w_t = ar(L) y_t` (t >= m) has a band covariance of
/// bandwidth `m`. The transformation has unit Jacobian, so one banded
/// Cholesky factor gives both `ln |Cov(y)|` and the residuals `L^{-1} w`.
#[derive(Debug, Clone, Default)]
pub struct AnsleyFilter {
    ar: Vec<f64>,
    m: usize,
    n: usize,
    cholesky: Option<BandCholesky>,
}

impl ArmaFilter for AnsleyFilter {
    fn prepare(&mut self, model: &ArmaModel, n: usize) -> Result<usize> {
        let (p, q) = (model.p(), model.q());
        let m = p.max(q);
        let var = model.var;
        let ma = &model.ma[..=q];
        let gamma = model.autocovariances(m.max(1))?;
        let psi = model.psi_weights(q + 1);

        let bw = m.min(n.saturating_sub(1));
        let mut band = SymmetricBandMatrix::zeros(n, bw);
        let head = m.min(n);
        for i in 0..head {
            for j in i..head {
                band.set(j, i, gamma[j - i])?;
            }
        }
        for s in m..n {
            for t in s.saturating_sub(bw)..s {
                let lag = s - t;
                let c = if t < m {
                    // Cov(ma(L) e_s, y_t) = var * sum_j ma_j psi_{t-s+j}
                    (lag..=q).map(|j| ma[j] * psi[j - lag]).sum::<f64>()
                } else {
                    (0..=q.saturating_sub(lag))
                        .filter(|&j| j + lag <= q)
                        .map(|j| ma[j] * ma[j + lag])
                        .sum::<f64>()
                };
                band.set(s, t, var * c)?;
            }
            band.set(s, s, var * ma.iter().map(|c| c * c).sum::<f64>())?;
        }

        self.ar = model.ar[..=p].to_vec();
        self.m = m;
        self.n = n;
        self.cholesky = Some(band.cholesky(CHOLESKY_EPSILON));
        Ok(n)
    }

    fn apply(&self, y: &[f64], out: &mut [f64]) -> Result<()> {
        check_apply(self.cholesky.as_ref().map(|_| (self.n, self.n)), y, out)?;
        let Some(cholesky) = &self.cholesky else {
            return Ok(());
        };
        for (t, w) in out.iter_mut().enumerate() {
            *w = if t < self.m {
                y[t]
            } else {
                self.ar.iter().enumerate().map(|(i, c)| c * y[t - i]).sum()
            };
        }
        cholesky.lsolve(out);
        Ok(())
    }

    fn log_determinant(&self) -> f64 {
        self.cholesky.as_ref().map_or(0.0, |c| c.log_determinant())
    }
}
