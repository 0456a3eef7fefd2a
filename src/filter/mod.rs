//! Kalman filters over the [`crate::ssf`] contracts.
//!
//! Observations are `f64` with `NaN` marking a missing value. All filters
//! store the *predicted* quantities `a_{t|t-1}`, `P_{t|t-1}` when asked to
//! keep them, since that is what the smoothers consume.

pub mod ckms;
pub mod diffuse;
pub mod ordinary;
pub mod smoother;

use nalgebra::{DMatrix, DVector};

pub use ckms::{CkmsFilter, CkmsResults, CkmsState};
pub use diffuse::{DiffuseFilter, DiffuseFilterResults, DiffuseStatus};
pub use ordinary::OrdinaryFilter;
pub use smoother::{DiffuseSmoother, OrdinarySmoother, SmoothingResults};

use crate::likelihood::Likelihood;
use crate::types::{FilterConfig, Storage};

/// Output of a forward pass.
#[derive(Debug, Clone)]
pub struct FilterResults {
    /// Prediction of the state at position `n`, one step past the data.
    pub final_state: DVector<f64>,
    /// Its covariance (the stationary part for a diffuse run).
    pub final_covariance: DMatrix<f64>,
    pub likelihood: Likelihood,
    /// Prediction errors `v_t` (`NaN` when missing).
    pub errors: Vec<f64>,
    /// Prediction-error variances `f_t` (`Fstar` during the diffuse phase).
    pub variances: Vec<f64>,
    /// `Finf` at each position of the diffuse phase.
    pub diffuse_variances: Vec<f64>,
    /// Predicted states `a_t`; empty unless `Storage::Full`.
    pub states: Vec<DVector<f64>>,
    /// Predicted covariances `P_t` (`Pstar_t` in the diffuse phase).
    pub covariances: Vec<DMatrix<f64>>,
    /// `Pinf_t` over the diffuse phase.
    pub diffuse_covariances: Vec<DMatrix<f64>>,
    pub storage: Storage,
    /// Variances at or below it were skipped by the filter.
    pub zero_variance: f64,
}

impl FilterResults {
    pub(crate) fn with_capacity(n: usize, config: &FilterConfig) -> Self {
        let storage = config.storage;
        let full = storage == Storage::Full;
        Self {
            final_state: DVector::zeros(0),
            final_covariance: DMatrix::zeros(0, 0),
            likelihood: Likelihood::new(0, 0.0, 0.0),
            errors: Vec::with_capacity(n),
            variances: Vec::with_capacity(n),
            diffuse_variances: Vec::new(),
            states: Vec::with_capacity(if full { n } else { 0 }),
            covariances: Vec::with_capacity(if full { n } else { 0 }),
            diffuse_covariances: Vec::new(),
            storage,
            zero_variance: config.zero_variance,
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `v_t / sqrt(f_t)` at the informative positions (diffuse steps excluded).
    pub fn standardized_residuals(&self) -> Vec<f64> {
        let nd = self.diffuse_variances.len();
        self.errors
            .iter()
            .zip(&self.variances)
            .enumerate()
            .filter(|(t, (v, f))| {
                !v.is_nan() && **f > self.zero_variance && (*t >= nd || self.diffuse_variances[*t] == 0.0)
            })
            .map(|(_, (v, f))| v / f.sqrt())
            .collect()
    }
}

/// `P <- P - m m' / f`, exactly symmetric.
pub(crate) fn rank_one_downdate(p: &mut DMatrix<f64>, m: &DVector<f64>, f: f64) {
    let n = m.len();
    for j in 0..n {
        let mj = m[j] / f;
        if mj == 0.0 {
            continue;
        }
        for i in 0..n {
            p[(i, j)] -= m[i] * mj;
        }
    }
    crate::matrix::symmetric::symmetrize(p);
}
