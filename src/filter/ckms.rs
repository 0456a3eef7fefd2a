//! Chandrasekhar (CKMS) recursions for time-invariant models.
//!
//! Instead of propagating `P_t`, the filter tracks its rank-one increment
//! `P_{t+1} - P_t = m_t l_t l_t'` together with `k_t = T P_t Z'` and `f_t`:
//!
//!   z_l     = Z l_t
//!   f_{t+1} = f_t + m_t z_l^2
//!   k_{t+1} = k_t + m_t z_l T l_t
//!   l_{t+1} = T l_t - k_t z_l / f_t
//!   m_{t+1} = m_t f_t / f_{t+1}
//!
//! Starting from the stationary covariance the first increment is
//! `-k_1 k_1' / f_1`, i.e. `l_1 = k_1`, `m_1 = -1 / f_1`. Once the increment
//! is negligible (`|m| |l|^2 < convergence * f`) `f` and `k` are frozen and
//! only the state recursion runs.

use nalgebra::DVector;
use tracing::debug;

use crate::error::{Result, SsfError};
use crate::filter::ordinary::Accumulator;
use crate::likelihood::Likelihood;
use crate::ssf::Ssf;
use crate::types::FilterConfig;

/// Starting point of the recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct CkmsState {
    pub a: DVector<f64>,
    /// `T P Z'`
    pub k: DVector<f64>,
    pub l: DVector<f64>,
    pub f: f64,
    pub m: f64,
}

impl CkmsState {
    /// State built from `a0` and `Pstar0`, which must be the stationary
    /// covariance of the dynamics.
    pub fn stationary(ssf: &Ssf) -> Result<Self> {
        check_model(ssf)?;
        let p0 = ssf.initialization.pf0();
        let loading = &ssf.measurement.loading;
        let f = loading.zvz(0, &p0) + ssf.measurement.error_variance;
        if !(f > 0.0) || !f.is_finite() {
            return Err(SsfError::InvalidVariance(f));
        }
        let mut k = loading.zm(0, &p0);
        ssf.dynamics.tx(0, &mut k);
        Ok(Self {
            a: ssf.initialization.a0(),
            l: k.clone(),
            k,
            f,
            m: -1.0 / f,
        })
    }
}

fn check_model(ssf: &Ssf) -> Result<()> {
    if ssf.diffuse_dim() > 0 {
        return Err(SsfError::Unsupported(
            "CKMS recursions need a model without diffuse components".into(),
        ));
    }
    if !ssf.is_time_invariant() {
        return Err(SsfError::Unsupported(
            "CKMS recursions need time-invariant dynamics and loading".into(),
        ));
    }
    Ok(())
}

/// The covariance-free part of the recursion: `f_t`, `k_t` and the increment.
#[derive(Debug, Clone)]
pub(crate) struct Gain {
    pub k: DVector<f64>,
    pub l: DVector<f64>,
    pub f: f64,
    pub m: f64,
    pub steady: bool,
}

impl Gain {
    fn split(state: CkmsState) -> (DVector<f64>, Self) {
        let CkmsState { a, k, l, f, m } = state;
        (a, Self { k, l, f, m, steady: false })
    }

    pub fn new(state: &CkmsState) -> Self {
        Self {
            k: state.k.clone(),
            l: state.l.clone(),
            f: state.f,
            m: state.m,
            steady: false,
        }
    }

    /// Moves `f` and `k` from position `t` to `t + 1`. Returns true when the
    /// increment vanishes; the gain is frozen from then on.
    pub fn advance(&mut self, ssf: &Ssf, t: usize, convergence: f64) -> bool {
        if self.steady {
            return false;
        }
        // Z l can vanish while l does not (MA models with gamma(1) = 0), so
        // the test is on the whole increment m l l'.
        if self.m.abs() * self.l.norm_squared() < convergence * self.f {
            self.steady = true;
            return true;
        }
        let zl = ssf.measurement.loading.zx(t, &self.l);
        let correction = self.m * zl * zl;
        let mut tl = self.l.clone();
        ssf.dynamics.tx(t, &mut tl);
        let fnext = self.f + correction;
        let mut lnext = tl.clone();
        lnext.axpy(-zl / self.f, &self.k, 1.0);
        self.k.axpy(self.m * zl, &tl, 1.0);
        self.l = lnext;
        self.m *= self.f / fnext;
        self.f = fnext;
        false
    }
}

#[derive(Debug, Clone)]
pub struct CkmsResults {
    /// `a_{n+1|n}`
    pub final_state: DVector<f64>,
    pub likelihood: Likelihood,
    pub errors: Vec<f64>,
    pub variances: Vec<f64>,
    /// First position processed with frozen gain, if any.
    pub steady_state_at: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CkmsFilter {
    config: FilterConfig,
}

impl CkmsFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, ssf: &Ssf, data: &[f64], initial: CkmsState) -> Result<CkmsResults> {
        check_model(ssf)?;
        if let Some(pos) = data.iter().position(|y| y.is_nan()) {
            return Err(SsfError::DataError(format!(
                "CKMS recursions do not handle missing values (position {pos})"
            )));
        }
        let dim = ssf.dim();
        for (what, len) in [
            ("ckms state", initial.a.len()),
            ("ckms gain", initial.k.len()),
            ("ckms increment", initial.l.len()),
        ] {
            if len != dim {
                return Err(SsfError::DimensionMismatch {
                    what,
                    expected: dim,
                    got: len,
                });
            }
        }

        let loading = &ssf.measurement.loading;
        let dynamics = ssf.dynamics.as_ref();
        let (mut a, mut gain) = Gain::split(initial);
        let mut acc = Accumulator::new();
        let mut errors = Vec::with_capacity(data.len());
        let mut variances = Vec::with_capacity(data.len());
        let mut steady_state_at = None;

        for (t, &y) in data.iter().enumerate() {
            let v = y - loading.zx(t, &a);
            acc.add(v, gain.f)?;
            errors.push(v);
            variances.push(gain.f);

            dynamics.tx(t, &mut a);
            a.axpy(v / gain.f, &gain.k, 1.0);

            if steady_state_at.is_none() && gain.advance(ssf, t, self.config.ckms_convergence) {
                steady_state_at = Some(t + 1);
                debug!(position = t + 1, f = gain.f, "ckms steady state");
            }
        }

        Ok(CkmsResults {
            final_state: a,
            likelihood: acc.likelihood(),
            errors,
            variances,
            steady_state_at,
        })
    }
}
