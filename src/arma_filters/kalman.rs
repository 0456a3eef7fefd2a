use nalgebra::DVector;

use crate::arma_filters::{check_apply, ArmaFilter};
use crate::error::Result;
use crate::filter::ckms::{CkmsState, Gain};
use crate::model::ArmaModel;
use crate::ssf::arma::ArmaSsf;
use crate::ssf::Ssf;

/// Chandrasekhar recursions on the forecast-form state. `prepare` runs the
/// gain recursion once; `apply` only propagates the state:
///   v_t = y_t - a_t[0],  e_t = v_t / sqrt(f_t),  a_{t+1} = T a_t + k_t v_t / f_t
#[derive(Clone, Default)]
pub struct KalmanArmaFilter {
    ssf: Option<Ssf>,
    n: usize,
    /// `(f_t, k_t)` until the gain freezes; the last entry holds afterwards.
    gains: Vec<(f64, DVector<f64>)>,
    logdet: f64,
}

/// Relative size of the covariance increment at which the gain is frozen.
const CONVERGENCE: f64 = 1e-13;

impl KalmanArmaFilter {
    fn gain(&self, t: usize) -> &(f64, DVector<f64>) {
        &self.gains[t.min(self.gains.len() - 1)]
    }
}

impl ArmaFilter for KalmanArmaFilter {
    fn prepare(&mut self, model: &ArmaModel, n: usize) -> Result<usize> {
        let ssf = ArmaSsf::new(model)?.into_ssf()?;
        let mut gain = Gain::new(&CkmsState::stationary(&ssf)?);
        self.gains.clear();
        self.logdet = 0.0;
        for t in 0..n {
            self.logdet += gain.f.ln();
            if !gain.steady {
                self.gains.push((gain.f, gain.k.clone()));
                gain.advance(&ssf, t, CONVERGENCE);
            }
        }
        if self.gains.is_empty() {
            self.gains.push((gain.f, gain.k.clone()));
        }
        self.ssf = Some(ssf);
        self.n = n;
        Ok(n)
    }

    fn apply(&self, y: &[f64], out: &mut [f64]) -> Result<()> {
        check_apply(self.ssf.as_ref().map(|_| (self.n, self.n)), y, out)?;
        let Some(ssf) = self.ssf.as_ref() else {
            return Ok(());
        };
        let mut a = DVector::zeros(ssf.dim());
        for (t, (&yt, e)) in y.iter().zip(out.iter_mut()).enumerate() {
            let (f, k) = self.gain(t);
            let v = yt - a[0];
            *e = v / f.sqrt();
            ssf.dynamics.tx(t, &mut a);
            a.axpy(v / f, k, 1.0);
        }
        Ok(())
    }

    fn log_determinant(&self) -> f64 {
        self.logdet
    }
}
