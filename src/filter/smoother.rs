//! Fixed-interval smoothing (de Jong / Koopman backward recursions).
//!
//! Ordinary positions propagate
//!
//!   r_{t-1} = Z' v_t / f_t + L_t' r_t
//!   N_{t-1} = Z' Z / f_t + L_t' N_t L_t,      L_t = T - T P Z' Z / f_t
//!
//! and give `a_t|n = a_t + P_t r_{t-1}`, `V_t = P_t - P_t N_{t-1} P_t`.
//! Over the diffuse phase the recursion carries `(r0, r1)` and `(N0, N1, N2)`.

use nalgebra::{DMatrix, DVector};
use tracing::instrument;

use crate::error::{Result, SsfError};
use crate::filter::{DiffuseFilterResults, FilterResults};
use crate::matrix::symmetric::{quadratic_form_matrix, symmetrize};
use crate::ssf::Ssf;
use crate::types::{FilterConfig, Storage};

/// Smoothed states `a_t|n` and their covariances.
#[derive(Debug, Clone)]
pub struct SmoothingResults {
    pub states: Vec<DVector<f64>>,
    pub variances: Vec<DMatrix<f64>>,
}

impl SmoothingResults {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn component(&self, i: usize) -> Vec<f64> {
        self.states.iter().map(|a| a[i]).collect()
    }

    pub fn component_variance(&self, i: usize) -> Vec<f64> {
        self.variances.iter().map(|v| v[(i, i)]).collect()
    }

    /// `Z_t a_t|n` through the model's loading.
    pub fn signal(&self, ssf: &Ssf) -> Vec<f64> {
        let loading = &ssf.measurement.loading;
        self.states
            .iter()
            .enumerate()
            .map(|(t, a)| loading.zx(t, a))
            .collect()
    }

    /// `Z_t V_t|n Z_t'`
    pub fn signal_variance(&self, ssf: &Ssf) -> Vec<f64> {
        let loading = &ssf.measurement.loading;
        self.variances
            .iter()
            .enumerate()
            .map(|(t, v)| loading.zvz(t, v))
            .collect()
    }

    fn reversed(mut states: Vec<DVector<f64>>, mut variances: Vec<DMatrix<f64>>) -> Self {
        states.reverse();
        variances.reverse();
        Self { states, variances }
    }
}

fn check_storage(results: &FilterResults) -> Result<()> {
    if results.storage != Storage::Full || results.states.len() != results.len() {
        return Err(SsfError::Unsupported(
            "smoothing needs a filter run with Storage::Full".into(),
        ));
    }
    Ok(())
}

/// Ordinary backward step at `t`; missing or uninformative positions only
/// propagate through `T`. Returns the smoothed state and covariance.
fn ordinary_step(
    ssf: &Ssf,
    results: &FilterResults,
    t: usize,
    zero_variance: f64,
    r: &mut DVector<f64>,
    n: &mut DMatrix<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let dynamics = ssf.dynamics.as_ref();
    let (a, p) = (&results.states[t], &results.covariances[t]);
    let (v, f) = (results.errors[t], results.variances[t]);
    dynamics.xt(t, r);
    dynamics.ttvt(t, n);
    if is_observed(v, f, zero_variance) {
        update_backward(ssf, t, p, v, f, r, n);
    }
    let mut var = p - quadratic_form_matrix(n, p);
    symmetrize(&mut var);
    (a + p * &*r, var)
}

fn update_backward(
    ssf: &Ssf,
    t: usize,
    p: &DMatrix<f64>,
    v: f64,
    f: f64,
    r: &mut DVector<f64>,
    n: &mut DMatrix<f64>,
) {
    let loading = &ssf.measurement.loading;
    let m = loading.zm(t, p);
    // r <- T'r + Z'(v - M'T'r) / f
    let c = (v - m.dot(r)) / f;
    loading.xpzd(t, r, c);
    // N <- W - (Z wm' + wm Z') / f + Z'Z (M'wm / f^2 + 1 / f),  W = T'NT
    let wm = &*n * &m;
    let q = m.dot(&wm);
    let z = loading.z(t);
    n.ger(-1.0 / f, &z, &wm, 1.0);
    n.ger(-1.0 / f, &wm, &z, 1.0);
    loading.vpzdz(t, n, q / (f * f) + 1.0 / f);
    symmetrize(n);
}

fn is_observed(v: f64, f: f64, zero_variance: f64) -> bool {
    !v.is_nan() && f > zero_variance
}

#[derive(Debug, Clone, Default)]
pub struct OrdinarySmoother {
    config: FilterConfig,
}

impl OrdinarySmoother {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(n = results.len()))]
    pub fn smooth(&self, ssf: &Ssf, results: &FilterResults) -> Result<SmoothingResults> {
        check_storage(results)?;
        if !results.diffuse_variances.is_empty() {
            return Err(SsfError::Unsupported(
                "a diffuse filter run needs the diffuse smoother".into(),
            ));
        }
        let dim = ssf.dim();
        let mut r = DVector::zeros(dim);
        let mut n = DMatrix::zeros(dim, dim);
        let len = results.len();
        let mut states = Vec::with_capacity(len);
        let mut variances = Vec::with_capacity(len);
        for t in (0..len).rev() {
            let (a, v) = ordinary_step(ssf, results, t, self.config.zero_variance, &mut r, &mut n);
            states.push(a);
            variances.push(v);
        }
        Ok(SmoothingResults::reversed(states, variances))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffuseSmoother {
    config: FilterConfig,
}

impl DiffuseSmoother {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(n = filtered.results.len(), diffuse_end = filtered.diffuse_end()))]
    pub fn smooth(&self, ssf: &Ssf, filtered: &DiffuseFilterResults) -> Result<SmoothingResults> {
        let results = &filtered.results;
        check_storage(results)?;
        let end = filtered.diffuse_end();
        if results.diffuse_covariances.len() != end || results.diffuse_variances.len() != end {
            return Err(SsfError::Unsupported(
                "filter output does not cover the diffuse phase".into(),
            ));
        }
        let zero_variance = self.config.zero_variance;
        let dim = ssf.dim();
        let len = results.len();
        let mut r0 = DVector::zeros(dim);
        let mut n0 = DMatrix::zeros(dim, dim);
        let mut states = Vec::with_capacity(len);
        let mut variances = Vec::with_capacity(len);

        for t in (end..len).rev() {
            let (a, v) = ordinary_step(ssf, results, t, zero_variance, &mut r0, &mut n0);
            states.push(a);
            variances.push(v);
        }

        let mut r1 = DVector::zeros(dim);
        let mut n1 = DMatrix::zeros(dim, dim);
        let mut n2 = DMatrix::zeros(dim, dim);
        let loading = &ssf.measurement.loading;
        for t in (0..end).rev() {
            let a = &results.states[t];
            let pstar = &results.covariances[t];
            let pinf = &results.diffuse_covariances[t];
            let (v, fstar, finf) = (results.errors[t], results.variances[t], results.diffuse_variances[t]);
            let tt = ssf.dynamics.t(t);
            let z = loading.z(t);

            if !v.is_nan() && finf > 0.0 {
                let minf = loading.zm(t, pinf);
                let mstar = loading.zm(t, pstar);
                let k0 = &tt * &minf / finf;
                let k1 = &tt * (&mstar - &minf * (fstar / finf)) / finf;
                let l0 = &tt - &k0 * z.transpose();
                let l1 = -(&k1 * z.transpose());
                let zz = &z * z.transpose();

                let r1_next = &z * (v / finf) + l0.tr_mul(&r1) + l1.tr_mul(&r0);
                let r0_next = l0.tr_mul(&r0);
                let n0_next = quadratic_form_matrix(&n0, &l0);
                let n1_next = &zz / finf
                    + l0.tr_mul(&n1) * &l0
                    + l1.tr_mul(&n0) * &l0
                    + l0.tr_mul(&n0) * &l1;
                let n2_next = &zz * (-fstar / (finf * finf))
                    + l0.tr_mul(&n2) * &l0
                    + l0.tr_mul(&n1) * &l1
                    + l1.tr_mul(&n1) * &l0
                    + l1.tr_mul(&n0) * &l1;
                r0 = r0_next;
                r1 = r1_next;
                n0 = n0_next;
                n1 = n1_next;
                n2 = n2_next;
            } else if is_observed(v, fstar, zero_variance) {
                let mstar = loading.zm(t, pstar);
                let k = &tt * &mstar / fstar;
                let l = &tt - &k * z.transpose();
                r0 = &z * (v / fstar) + l.tr_mul(&r0);
                r1 = tt.tr_mul(&r1);
                n0 = &z * z.transpose() / fstar + quadratic_form_matrix(&n0, &l);
                n1 = tt.tr_mul(&n1) * &l;
                n2 = quadratic_form_matrix(&n2, &tt);
            } else {
                r0 = tt.tr_mul(&r0);
                r1 = tt.tr_mul(&r1);
                n0 = quadratic_form_matrix(&n0, &tt);
                n1 = tt.tr_mul(&n1) * &tt;
                n2 = quadratic_form_matrix(&n2, &tt);
            }

            states.push(a + pstar * &r0 + pinf * &r1);
            let cross = pinf * &n1 * pstar;
            let mut var = pstar
                - quadratic_form_matrix(&n0, pstar)
                - cross.transpose()
                - &cross
                - quadratic_form_matrix(&n2, pinf);
            symmetrize(&mut var);
            variances.push(var);
        }

        Ok(SmoothingResults::reversed(states, variances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{DiffuseFilter, OrdinaryFilter};
    use crate::matrix::symmetric::{lcholesky, CHOLESKY_EPSILON};
    use crate::matrix::triangular::{lsolve, rsolve};
    use crate::model::{ArimaModel, ArmaModel};
    use crate::ssf::arima::ArimaSsf;
    use crate::ssf::arma::ArmaSsf;
    use crate::ssf::{FixedLoading, Measurement, SsfDynamics, SsfInitialization, SsfLoading};
    use std::sync::Arc;

    fn full() -> FilterConfig {
        FilterConfig::default().with_storage(Storage::Full)
    }

    #[test]
    fn test_ar1_missing_value_interpolation() {
        let phi = 0.7;
        let model = ArmaModel::new(vec![1.0, -phi], vec![1.0], 1.0).unwrap();
        let ssf = ArmaSsf::new(&model).unwrap().into_ssf().unwrap();
        let y = [0.4, -1.0, f64::NAN, 2.0, 0.5];
        let filtered = OrdinaryFilter::new(full()).process(&ssf, &y).unwrap();
        let smoothed = OrdinarySmoother::default().smooth(&ssf, &filtered).unwrap();
        let expected = phi * (y[1] + y[3]) / (1.0 + phi * phi);
        assert!((smoothed.states[2][0] - expected).abs() < 1e-12);
        assert!((smoothed.variances[2][(0, 0)] - 1.0 / (1.0 + phi * phi)).abs() < 1e-12);
        // observed without error
        assert!((smoothed.states[0][0] - y[0]).abs() < 1e-12);
        assert!(smoothed.variances[4][(0, 0)].abs() < 1e-12);
    }

    #[test]
    fn test_missing_values_match_conditional_expectation() {
        let model = ArmaModel::new(vec![1.0, -0.5], vec![1.0, 0.4], 1.3).unwrap();
        let ssf = ArmaSsf::new(&model).unwrap().into_ssf().unwrap();
        let mut y: Vec<f64> = (0..25).map(|t| ((t * 7) % 11) as f64 / 3.0 - 1.5).collect();
        let missing = [0, 9, 10, 24];
        for &t in &missing {
            y[t] = f64::NAN;
        }
        let filtered = OrdinaryFilter::new(full()).process(&ssf, &y).unwrap();
        let smoothed = OrdinarySmoother::default().smooth(&ssf, &filtered).unwrap();
        let signal = smoothed.signal(&ssf);
        let signal_var = smoothed.signal_variance(&ssf);

        let gamma = model.autocovariances(25).unwrap();
        let obs: Vec<usize> = (0..25).filter(|t| !missing.contains(t)).collect();
        let mut l = DMatrix::from_fn(obs.len(), obs.len(), |i, j| gamma[obs[i].abs_diff(obs[j])]);
        lcholesky(&mut l, CHOLESKY_EPSILON);
        // Sigma^{-1} y_obs
        let mut w = DVector::from_iterator(obs.len(), obs.iter().map(|&t| y[t]));
        lsolve(&l, &mut w);
        rsolve(&l, &mut w);
        for &t in &missing {
            let c = DVector::from_iterator(obs.len(), obs.iter().map(|&s| gamma[s.abs_diff(t)]));
            let mean = c.dot(&w);
            let mut u = c.clone();
            lsolve(&l, &mut u);
            let var = gamma[0] - u.norm_squared();
            assert!((signal[t] - mean).abs() < 1e-9, "mean at {t}: {} vs {mean}", signal[t]);
            assert!((signal_var[t] - var).abs() < 1e-9, "variance at {t}: {} vs {var}", signal_var[t]);
        }
    }

    #[test]
    fn test_likelihood_only_run_is_unsupported() {
        let model = ArmaModel::new(vec![1.0, -0.5], vec![1.0], 1.0).unwrap();
        let ssf = ArmaSsf::new(&model).unwrap().into_ssf().unwrap();
        let filtered = OrdinaryFilter::default().process(&ssf, &[1.0, 2.0]).unwrap();
        assert!(matches!(
            OrdinarySmoother::default().smooth(&ssf, &filtered),
            Err(SsfError::Unsupported(_))
        ));
    }

    #[test]
    fn test_random_walk_with_missing_first_value() {
        let model = ArimaModel::new(vec![1.0], vec![1.0, -1.0], vec![1.0], 1.0).unwrap();
        let ssf = crate::ssf::arima::ssf(&model).unwrap();
        let y = [f64::NAN, 2.0, 3.5, f64::NAN, 1.0];
        let filtered = DiffuseFilter::new(full()).process(&ssf, &y).unwrap();
        assert_eq!(filtered.diffuse_end(), 2);
        let smoothed = DiffuseSmoother::default().smooth(&ssf, &filtered).unwrap();
        let signal = smoothed.signal(&ssf);
        let var = smoothed.signal_variance(&ssf);
        assert!((signal[0] - 2.0).abs() < 1e-10, "{}", signal[0]);
        assert!((var[0] - 1.0).abs() < 1e-10, "{}", var[0]);
        assert!((signal[3] - 2.25).abs() < 1e-10);
        assert!((var[3] - 0.5).abs() < 1e-10);
        assert!((signal[2] - 3.5).abs() < 1e-10);
        assert!(var[2].abs() < 1e-10);
    }

    /// Same dynamics, diffuse part replaced by a huge but finite variance.
    struct LargePrior {
        inner: Arc<ArimaSsf>,
        kappa: f64,
    }

    impl SsfInitialization for LargePrior {
        fn dim(&self) -> usize {
            SsfInitialization::dim(self.inner.as_ref())
        }

        fn pf0(&self) -> DMatrix<f64> {
            self.inner.pf0() + self.inner.pi0() * self.kappa
        }
    }

    #[test]
    fn test_diffuse_smoother_is_limit_of_large_prior() {
        let model = ArimaModel::new(vec![1.0], vec![1.0, -1.0], vec![1.0, 0.3], 0.5).unwrap();
        let arima = Arc::new(ArimaSsf::new(&model).unwrap());
        let loading: Arc<dyn SsfLoading> = Arc::new(FixedLoading::new(arima.design()));
        let dynamics: Arc<dyn SsfDynamics> = arima.clone();
        let measurement = Measurement::new(loading, 0.8).unwrap();
        let exact = Ssf::new(arima.clone(), dynamics.clone(), measurement.clone()).unwrap();
        let approx = Ssf::new(
            // the gap shrinks like 1 / kappa until cancellation takes over near 1e7
            Arc::new(LargePrior { inner: arima, kappa: 1e5 }),
            dynamics,
            measurement,
        )
        .unwrap();

        let y = [1.0, 1.6, f64::NAN, 2.9, 2.4, 3.8, 4.1, f64::NAN, 5.0, 4.4];
        let d = DiffuseFilter::new(full()).process(&exact, &y).unwrap();
        let sd = DiffuseSmoother::default().smooth(&exact, &d).unwrap();
        let o = OrdinaryFilter::new(full()).process(&approx, &y).unwrap();
        let so = OrdinarySmoother::default().smooth(&approx, &o).unwrap();
        for t in 0..y.len() {
            let (a, b) = (&sd.states[t], &so.states[t]);
            assert!((a - b).amax() < 1e-3, "state at {t}: {a} vs {b}");
            let dv = (&sd.variances[t] - &so.variances[t]).amax();
            assert!(dv < 1e-4, "variance at {t} differs by {dv}");
        }
    }

    #[test]
    fn test_diffuse_smoother_without_diffuse_part() {
        let model = ArmaModel::new(vec![1.0, -0.3], vec![1.0, 0.5], 1.0).unwrap();
        let ssf = ArmaSsf::new(&model).unwrap().into_ssf().unwrap();
        let y = [0.3, f64::NAN, -0.2, 1.1, 0.7];
        let d = DiffuseFilter::new(full()).process(&ssf, &y).unwrap();
        let o = OrdinaryFilter::new(full()).process(&ssf, &y).unwrap();
        let sd = DiffuseSmoother::default().smooth(&ssf, &d).unwrap();
        let so = OrdinarySmoother::default().smooth(&ssf, &o).unwrap();
        for t in 0..y.len() {
            assert!((&sd.states[t] - &so.states[t]).amax() < 1e-14);
        }
    }
}
