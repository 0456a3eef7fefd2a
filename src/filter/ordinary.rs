use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SsfError};
use crate::filter::{rank_one_downdate, FilterResults};
use crate::likelihood::Likelihood;
use crate::matrix::DeterminantalTerm;
use crate::ssf::{Measurement, MultivariateSsf, Ssf, SsfDynamics};
use crate::types::{FilterConfig, Storage};

/// Predict-update Kalman filter for models without diffuse components.
///
/// Per position `t`:
///   - Innovation: v_t = y_t - Z a_t,  f_t = Z P_t Z' + H
///   - Update:     a += P Z' v_t / f_t,  P -= (P Z')(P Z')' / f_t
///   - Predict:    a <- T a,  P <- T P T' + V
///
/// `f_t <= zero_variance` carries no information: the update is skipped.
#[derive(Debug, Clone, Default)]
pub struct OrdinaryFilter {
    config: FilterConfig,
}

/// Accumulators of one run.
pub(crate) struct Accumulator {
    pub det: DeterminantalTerm,
    pub ssq: f64,
    pub n: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            det: DeterminantalTerm::new(),
            ssq: 0.0,
            n: 0,
        }
    }

    pub fn add(&mut self, v: f64, f: f64) -> Result<()> {
        self.det.add(f)?;
        self.ssq += v * v / f;
        self.n += 1;
        Ok(())
    }

    pub fn likelihood(&self) -> Likelihood {
        Likelihood::new(self.n, self.det.log_determinant(), self.ssq)
    }
}

/// One measurement update; returns `(v, f)`.
pub(crate) fn update(
    measurement: &Measurement,
    pos: usize,
    y: f64,
    a: &mut DVector<f64>,
    p: &mut DMatrix<f64>,
    zero_variance: f64,
    acc: &mut Accumulator,
) -> Result<(f64, f64)> {
    let loading = &measurement.loading;
    let f = loading.zvz(pos, p) + measurement.error_variance;
    if f.is_nan() {
        return Err(SsfError::InvalidVariance(f));
    }
    let v = y - loading.zx(pos, a);
    if f <= zero_variance {
        return Ok((v, f));
    }
    let m = loading.zm(pos, p);
    a.axpy(v / f, &m, 1.0);
    rank_one_downdate(p, &m, f);
    acc.add(v, f)?;
    Ok((v, f))
}

/// a <- T a, P <- T P T' + V
pub(crate) fn predict(dynamics: &dyn SsfDynamics, pos: usize, a: &mut DVector<f64>, p: &mut DMatrix<f64>) {
    dynamics.tx(pos, a);
    dynamics.tvt(pos, p);
    dynamics.add_v(pos, p);
}

fn check_data(data_len: usize, what: &'static str) -> Result<()> {
    if data_len == 0 {
        return Err(SsfError::DataError(format!("no observations for {what}")));
    }
    Ok(())
}

impl OrdinaryFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn process(&self, ssf: &Ssf, data: &[f64]) -> Result<FilterResults> {
        check_data(data.len(), "the ordinary filter")?;
        if ssf.diffuse_dim() > 0 {
            return Err(SsfError::Unsupported(
                "diffuse initialization requires the diffuse filter".into(),
            ));
        }
        let storage = self.config.storage;
        let mut out = FilterResults::with_capacity(data.len(), &self.config);
        let mut a = ssf.initialization.a0();
        let mut p = ssf.initialization.pf0();
        let mut acc = Accumulator::new();

        for (t, &y) in data.iter().enumerate() {
            if storage == Storage::Full {
                out.states.push(a.clone());
                out.covariances.push(p.clone());
            }
            if y.is_nan() {
                out.errors.push(f64::NAN);
                out.variances.push(ssf.measurement.loading.zvz(t, &p) + ssf.measurement.error_variance);
            } else {
                let (v, f) = update(
                    &ssf.measurement,
                    t,
                    y,
                    &mut a,
                    &mut p,
                    self.config.zero_variance,
                    &mut acc,
                )?;
                out.errors.push(v);
                out.variances.push(f);
            }
            predict(ssf.dynamics.as_ref(), t, &mut a, &mut p);
        }

        out.final_state = a;
        out.final_covariance = p;
        out.likelihood = acc.likelihood();
        Ok(out)
    }

    /// Sequential univariate updates, one per measurement in the order of
    /// `mssf.measurements`, then a single prediction. `rows[t][i]` is the
    /// i-th component at position t. Errors and variances are stored row by
    /// row (`n_measurements` entries per position).
    pub fn process_multivariate(&self, mssf: &MultivariateSsf, rows: &[Vec<f64>]) -> Result<FilterResults> {
        check_data(rows.len(), "the multivariate filter")?;
        if mssf.initialization.diffuse_dim() > 0 {
            return Err(SsfError::Unsupported(
                "diffuse initialization requires the diffuse filter".into(),
            ));
        }
        let k = mssf.n_measurements();
        let storage = self.config.storage;
        let mut out = FilterResults::with_capacity(rows.len() * k, &self.config);
        let mut a = mssf.initialization.a0();
        let mut p = mssf.initialization.pf0();
        let mut acc = Accumulator::new();

        for (t, row) in rows.iter().enumerate() {
            if row.len() != k {
                return Err(SsfError::DimensionMismatch {
                    what: "observation row",
                    expected: k,
                    got: row.len(),
                });
            }
            if storage == Storage::Full {
                out.states.push(a.clone());
                out.covariances.push(p.clone());
            }
            for (m, &y) in mssf.measurements.iter().zip(row) {
                if y.is_nan() {
                    out.errors.push(f64::NAN);
                    out.variances.push(m.loading.zvz(t, &p) + m.error_variance);
                    continue;
                }
                let (v, f) = update(m, t, y, &mut a, &mut p, self.config.zero_variance, &mut acc)?;
                out.errors.push(v);
                out.variances.push(f);
            }
            predict(mssf.dynamics.as_ref(), t, &mut a, &mut p);
        }

        out.final_state = a;
        out.final_covariance = p;
        out.likelihood = acc.likelihood();
        Ok(out)
    }
}
