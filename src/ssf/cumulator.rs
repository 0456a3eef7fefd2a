//! Cumulated observation of an inner model, for temporal disaggregation.
//!
//! The state is `[c_t; alpha_t]` where `c_t` is the partial sum of the inner
//! signal `Z alpha` since the start of the current period. The observation is
//! the running total `c_t + Z alpha_t`, which equals the period aggregate at
//! the last position of a period.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::instrument;

use crate::error::{Result, SsfError};
use crate::filter::diffuse::DiffuseFilter;
use crate::filter::smoother::DiffuseSmoother;
use crate::ssf::{Ssf, SsfDynamics, SsfInitialization, SsfLoading};
use crate::types::{FilterConfig, Storage};

#[derive(Clone)]
pub struct CumulatorSsf {
    inner: Ssf,
    conversion: usize,
    start: usize,
}

impl CumulatorSsf {
    /// `conversion` high-frequency periods per aggregate; `start` is the
    /// position of the first observation inside its period.
    pub fn new(inner: Ssf, conversion: usize, start: usize) -> Result<Self> {
        if conversion < 2 {
            return Err(SsfError::ModelError(format!(
                "conversion ratio must be at least 2, got {conversion}"
            )));
        }
        Ok(Self {
            inner,
            conversion,
            start: start % conversion,
        })
    }

    fn inner_dim(&self) -> usize {
        self.inner.dim()
    }

    /// Whether position `pos` opens a new period.
    fn is_period_start(&self, pos: usize) -> bool {
        (pos + self.start) % self.conversion == 0
    }

    pub fn into_ssf(self) -> Result<Ssf> {
        let loading = Arc::new(CumulatorLoading {
            inner: self.inner.measurement.loading.clone(),
        });
        Ssf::from_model(Arc::new(self), loading, 0.0)
    }
}

struct CumulatorLoading {
    inner: Arc<dyn SsfLoading>,
}

fn tail(x: &DVector<f64>) -> DVector<f64> {
    x.rows(1, x.len() - 1).clone_owned()
}

impl SsfLoading for CumulatorLoading {
    fn is_time_invariant(&self) -> bool {
        false
    }

    fn z(&self, pos: usize) -> DVector<f64> {
        let zi = self.inner.z(pos);
        let mut z = DVector::zeros(zi.len() + 1);
        z[0] = 1.0;
        z.rows_mut(1, zi.len()).copy_from(&zi);
        z
    }

    fn zx(&self, pos: usize, x: &DVector<f64>) -> f64 {
        x[0] + self.inner.zx(pos, &tail(x))
    }
}

impl SsfInitialization for CumulatorSsf {
    fn dim(&self) -> usize {
        self.inner_dim() + 1
    }

    fn diffuse_dim(&self) -> usize {
        self.inner.diffuse_dim()
    }

    fn a0(&self) -> DVector<f64> {
        let inner = self.inner.initialization.a0();
        let mut a = DVector::zeros(inner.len() + 1);
        a.rows_mut(1, inner.len()).copy_from(&inner);
        a
    }

    fn pf0(&self) -> DMatrix<f64> {
        crate::ssf::block_diagonal(&DMatrix::zeros(1, 1), &self.inner.initialization.pf0())
    }

    fn b(&self) -> DMatrix<f64> {
        let inner = self.inner.initialization.b();
        let mut b = DMatrix::zeros(inner.nrows() + 1, inner.ncols());
        b.view_mut((1, 0), inner.shape()).copy_from(&inner);
        b
    }
}

impl SsfDynamics for CumulatorSsf {
    fn dim(&self) -> usize {
        self.inner_dim() + 1
    }

    fn is_time_invariant(&self) -> bool {
        false
    }

    fn t(&self, pos: usize) -> DMatrix<f64> {
        let n = self.inner_dim();
        let mut t = DMatrix::zeros(n + 1, n + 1);
        if !self.is_period_start(pos + 1) {
            t[(0, 0)] = 1.0;
            let z = self.inner.measurement.loading.z(pos);
            t.view_mut((0, 1), (1, n)).copy_from(&z.transpose());
        }
        t.view_mut((1, 1), (n, n))
            .copy_from(&self.inner.dynamics.t(pos));
        t
    }

    fn s(&self, pos: usize) -> DMatrix<f64> {
        let inner = self.inner.dynamics.s(pos);
        let mut s = DMatrix::zeros(inner.nrows() + 1, inner.ncols());
        s.view_mut((1, 0), inner.shape()).copy_from(&inner);
        s
    }

    fn innovations_dim(&self) -> usize {
        self.inner.dynamics.innovations_dim()
    }

    fn tx(&self, pos: usize, x: &mut DVector<f64>) {
        let mut alpha = tail(x);
        x[0] = if self.is_period_start(pos + 1) {
            0.0
        } else {
            x[0] + self.inner.measurement.loading.zx(pos, &alpha)
        };
        self.inner.dynamics.tx(pos, &mut alpha);
        x.rows_mut(1, alpha.len()).copy_from(&alpha);
    }

    fn xt(&self, pos: usize, x: &mut DVector<f64>) {
        let x0 = x[0];
        let mut alpha = tail(x);
        self.inner.dynamics.xt(pos, &mut alpha);
        if self.is_period_start(pos + 1) {
            x[0] = 0.0;
        } else {
            self.inner.measurement.loading.xpzd(pos, &mut alpha, x0);
        }
        x.rows_mut(1, alpha.len()).copy_from(&alpha);
    }

    fn add_v(&self, pos: usize, p: &mut DMatrix<f64>) {
        let n = self.inner_dim();
        let mut block = p.view((1, 1), (n, n)).clone_owned();
        self.inner.dynamics.add_v(pos, &mut block);
        p.view_mut((1, 1), (n, n)).copy_from(&block);
    }
}

/// Places period totals at the last position of each period, NaN elsewhere.
pub fn expand_aggregates(totals: &[f64], conversion: usize, n: usize) -> Vec<f64> {
    let mut data = vec![f64::NAN; n];
    for (i, &v) in totals.iter().enumerate() {
        let pos = (i + 1) * conversion - 1;
        if pos < n {
            data[pos] = v;
        }
    }
    data
}

/// High-frequency signal `Z alpha_t` of `inner` consistent with the period
/// totals, by diffuse smoothing of the cumulated model.
#[instrument(skip_all, fields(n = n, conversion = conversion))]
pub fn disaggregate(inner: Ssf, totals: &[f64], conversion: usize, n: usize) -> Result<Vec<f64>> {
    if totals.len() * conversion > n {
        return Err(SsfError::DataError(format!(
            "{} totals need {} positions, got {}",
            totals.len(),
            totals.len() * conversion,
            n
        )));
    }
    let loading = inner.measurement.loading.clone();
    let ssf = CumulatorSsf::new(inner, conversion, 0)?.into_ssf()?;
    let data = expand_aggregates(totals, conversion, n);
    let config = FilterConfig::default().with_storage(Storage::Full);
    let filtered = DiffuseFilter::new(config.clone()).process(&ssf, &data)?;
    let smoothed = DiffuseSmoother::new(config).smooth(&ssf, &filtered)?;
    Ok(smoothed
        .states
        .iter()
        .enumerate()
        .map(|(t, a)| loading.zx(t, &tail(a)))
        .collect())
}
