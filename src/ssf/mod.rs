//! State-space form: the capability contracts consumed by the filters.
//!
//! A model is the triple {initialization, dynamics, measurement}:
//!
//!   alpha_{t+1} = T_t alpha_t + S_t eta_t,      eta_t ~ N(0, I)
//!   y_t         = Z_t alpha_t + eps_t,          eps_t ~ N(0, H)
//!
//! with `alpha_0 ~ N(a0, Pstar0 + kappa * B B')`, kappa -> infinity.
//!
//! Every operation has a default written in terms of the dense matrices
//! `t(pos)` / `s(pos)` / `z(pos)`; adapters override the ones they can apply
//! functionally (shifts, companion rows, sparse loadings).

pub mod arima;
pub mod arma;
pub mod cholette;
pub mod cumulator;
pub mod spline;
pub mod var;

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SsfError};
use crate::matrix::symmetric::{quadratic_form, symmetrize, xxt};

pub trait SsfInitialization: Send + Sync {
    /// State dimension `nr`.
    fn dim(&self) -> usize;

    /// Number of diffuse directions `nd` (columns of `B`).
    fn diffuse_dim(&self) -> usize {
        0
    }

    fn a0(&self) -> DVector<f64> {
        DVector::zeros(self.dim())
    }

    /// Stationary part of the initial covariance.
    fn pf0(&self) -> DMatrix<f64>;

    /// Diffuse constraints, `nr x nd`.
    fn b(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.dim(), 0)
    }

    /// Diffuse part of the initial covariance.
    fn pi0(&self) -> DMatrix<f64> {
        xxt(&self.b())
    }
}

pub trait SsfDynamics: Send + Sync {
    fn dim(&self) -> usize;

    fn is_time_invariant(&self) -> bool {
        true
    }

    /// Transition matrix between `pos` and `pos + 1`.
    fn t(&self, pos: usize) -> DMatrix<f64>;

    /// Noise factor `S` (`nr x innovations_dim`), `V = S S'`.
    fn s(&self, pos: usize) -> DMatrix<f64>;

    fn innovations_dim(&self) -> usize;

    fn v(&self, pos: usize) -> DMatrix<f64> {
        xxt(&self.s(pos))
    }

    /// x <- T x
    fn tx(&self, pos: usize, x: &mut DVector<f64>) {
        *x = self.t(pos) * &*x;
    }

    /// x <- x'T (stored as a column)
    fn xt(&self, pos: usize, x: &mut DVector<f64>) {
        *x = self.t(pos).tr_mul(&*x);
    }

    /// M <- T M
    fn tm(&self, pos: usize, m: &mut DMatrix<f64>) {
        for j in 0..m.ncols() {
            let mut c = m.column(j).clone_owned();
            self.tx(pos, &mut c);
            m.set_column(j, &c);
        }
    }

    /// M <- T' M
    fn ttm(&self, pos: usize, m: &mut DMatrix<f64>) {
        for j in 0..m.ncols() {
            let mut c = m.column(j).clone_owned();
            self.xt(pos, &mut c);
            m.set_column(j, &c);
        }
    }

    /// V <- T V T'
    fn tvt(&self, pos: usize, v: &mut DMatrix<f64>) {
        self.tm(pos, v);
        v.transpose_mut();
        self.tm(pos, v);
        symmetrize(v);
    }

    /// V <- T' V T
    fn ttvt(&self, pos: usize, v: &mut DMatrix<f64>) {
        self.ttm(pos, v);
        v.transpose_mut();
        self.ttm(pos, v);
        symmetrize(v);
    }

    /// P <- P + V
    fn add_v(&self, pos: usize, p: &mut DMatrix<f64>) {
        *p += self.v(pos);
    }
}

pub trait SsfLoading: Send + Sync {
    fn is_time_invariant(&self) -> bool {
        true
    }

    /// Loading row at `pos`, as a column vector.
    fn z(&self, pos: usize) -> DVector<f64>;

    /// Z x
    fn zx(&self, pos: usize, x: &DVector<f64>) -> f64 {
        self.z(pos).dot(x)
    }

    /// Z M, one entry per column of `m`.
    fn zm(&self, pos: usize, m: &DMatrix<f64>) -> DVector<f64> {
        m.tr_mul(&self.z(pos))
    }

    /// Z V Z'
    fn zvz(&self, pos: usize, v: &DMatrix<f64>) -> f64 {
        quadratic_form(v, &self.z(pos))
    }

    /// V <- V + d Z'Z
    fn vpzdz(&self, pos: usize, v: &mut DMatrix<f64>, d: f64) {
        let z = self.z(pos);
        v.ger(d, &z, &z, 1.0);
    }

    /// x <- x + d Z'
    fn xpzd(&self, pos: usize, x: &mut DVector<f64>, d: f64) {
        x.axpy(d, &self.z(pos), 1.0);
    }
}

/// Loading that picks a single state component.
#[derive(Debug, Clone)]
pub struct UnitLoading {
    dim: usize,
    index: usize,
}

impl UnitLoading {
    pub fn new(dim: usize, index: usize) -> Result<Self> {
        if index >= dim {
            return Err(SsfError::DimensionMismatch {
                what: "unit loading index",
                expected: dim,
                got: index,
            });
        }
        Ok(Self { dim, index })
    }
}

impl SsfLoading for UnitLoading {
    fn z(&self, _pos: usize) -> DVector<f64> {
        let mut z = DVector::zeros(self.dim);
        z[self.index] = 1.0;
        z
    }

    fn zx(&self, _pos: usize, x: &DVector<f64>) -> f64 {
        x[self.index]
    }

    fn zm(&self, _pos: usize, m: &DMatrix<f64>) -> DVector<f64> {
        m.row(self.index).transpose()
    }

    fn zvz(&self, _pos: usize, v: &DMatrix<f64>) -> f64 {
        v[(self.index, self.index)]
    }

    fn vpzdz(&self, _pos: usize, v: &mut DMatrix<f64>, d: f64) {
        v[(self.index, self.index)] += d;
    }

    fn xpzd(&self, _pos: usize, x: &mut DVector<f64>, d: f64) {
        x[self.index] += d;
    }
}

/// Time-invariant dense loading.
#[derive(Debug, Clone)]
pub struct FixedLoading {
    z: DVector<f64>,
}

impl FixedLoading {
    pub fn new(z: DVector<f64>) -> Self {
        Self { z }
    }
}

impl SsfLoading for FixedLoading {
    fn z(&self, _pos: usize) -> DVector<f64> {
        self.z.clone()
    }

    fn zx(&self, _pos: usize, x: &DVector<f64>) -> f64 {
        self.z.dot(x)
    }

    fn zm(&self, _pos: usize, m: &DMatrix<f64>) -> DVector<f64> {
        m.tr_mul(&self.z)
    }

    fn zvz(&self, _pos: usize, v: &DMatrix<f64>) -> f64 {
        quadratic_form(v, &self.z)
    }
}

/// Loading plus the variance `H` of the measurement error.
#[derive(Clone)]
pub struct Measurement {
    pub loading: Arc<dyn SsfLoading>,
    pub error_variance: f64,
}

impl Measurement {
    pub fn new(loading: Arc<dyn SsfLoading>, error_variance: f64) -> Result<Self> {
        if !(error_variance >= 0.0) || !error_variance.is_finite() {
            return Err(SsfError::InvalidVariance(error_variance));
        }
        Ok(Self {
            loading,
            error_variance,
        })
    }

    /// Exact observation, `H = 0`.
    pub fn exact(loading: Arc<dyn SsfLoading>) -> Self {
        Self {
            loading,
            error_variance: 0.0,
        }
    }
}

/// Univariate state-space model.
#[derive(Clone)]
pub struct Ssf {
    pub initialization: Arc<dyn SsfInitialization>,
    pub dynamics: Arc<dyn SsfDynamics>,
    pub measurement: Measurement,
}

impl Ssf {
    pub fn new(
        initialization: Arc<dyn SsfInitialization>,
        dynamics: Arc<dyn SsfDynamics>,
        measurement: Measurement,
    ) -> Result<Self> {
        if initialization.dim() != dynamics.dim() {
            return Err(SsfError::DimensionMismatch {
                what: "dynamics",
                expected: initialization.dim(),
                got: dynamics.dim(),
            });
        }
        let z = measurement.loading.z(0);
        if z.len() != dynamics.dim() {
            return Err(SsfError::DimensionMismatch {
                what: "loading",
                expected: dynamics.dim(),
                got: z.len(),
            });
        }
        Ok(Self {
            initialization,
            dynamics,
            measurement,
        })
    }

    /// A model whose single object plays all three roles.
    pub fn from_model<M>(model: Arc<M>, loading: Arc<dyn SsfLoading>, error_variance: f64) -> Result<Self>
    where
        M: SsfInitialization + SsfDynamics + 'static,
    {
        let initialization: Arc<dyn SsfInitialization> = model.clone();
        let dynamics: Arc<dyn SsfDynamics> = model;
        Self::new(initialization, dynamics, Measurement::new(loading, error_variance)?)
    }

    pub fn dim(&self) -> usize {
        self.initialization.dim()
    }

    pub fn diffuse_dim(&self) -> usize {
        self.initialization.diffuse_dim()
    }

    pub fn is_time_invariant(&self) -> bool {
        self.dynamics.is_time_invariant() && self.measurement.loading.is_time_invariant()
    }
}

/// One dynamics observed through several measurements.
#[derive(Clone)]
pub struct MultivariateSsf {
    pub initialization: Arc<dyn SsfInitialization>,
    pub dynamics: Arc<dyn SsfDynamics>,
    pub measurements: Vec<Measurement>,
}

impl MultivariateSsf {
    pub fn new(
        initialization: Arc<dyn SsfInitialization>,
        dynamics: Arc<dyn SsfDynamics>,
        measurements: Vec<Measurement>,
    ) -> Result<Self> {
        if initialization.dim() != dynamics.dim() {
            return Err(SsfError::DimensionMismatch {
                what: "dynamics",
                expected: initialization.dim(),
                got: dynamics.dim(),
            });
        }
        for m in &measurements {
            let len = m.loading.z(0).len();
            if len != dynamics.dim() {
                return Err(SsfError::DimensionMismatch {
                    what: "loading",
                    expected: dynamics.dim(),
                    got: len,
                });
            }
        }
        Ok(Self {
            initialization,
            dynamics,
            measurements,
        })
    }

    pub fn dim(&self) -> usize {
        self.initialization.dim()
    }

    pub fn n_measurements(&self) -> usize {
        self.measurements.len()
    }
}

/// Block-diagonal stacking of two covariance matrices.
pub(crate) fn block_diagonal(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let (na, nb) = (a.nrows(), b.nrows());
    let mut m = DMatrix::zeros(na + nb, na + nb);
    m.view_mut((0, 0), (na, na)).copy_from(a);
    m.view_mut((na, na), (nb, nb)).copy_from(b);
    m
}
