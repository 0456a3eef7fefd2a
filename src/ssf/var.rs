//! VAR(p) transition block in companion form.
//!
//! State: `[x_t; x_{t-1}; ...; x_{t-p+1}]` (`k p` entries). The top block row
//! of `T` holds `A_1 .. A_p`, identity blocks sit below the diagonal.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{Result, SsfError};
use crate::matrix::symmetric::{lcholesky, symmetrize, CHOLESKY_EPSILON};
use crate::ssf::{Measurement, MultivariateSsf, SsfDynamics, SsfInitialization, UnitLoading};

#[derive(Debug, Clone)]
pub struct VarSsf {
    k: usize,
    lags: Vec<DMatrix<f64>>,
    sigma: DMatrix<f64>,
    sigma_factor: DMatrix<f64>,
    pstar0: DMatrix<f64>,
    diffuse: bool,
}

impl VarSsf {
    /// Stationary initialization: `P0` solves `P = T P T' + V`.
    pub fn stationary(lags: Vec<DMatrix<f64>>, sigma: DMatrix<f64>) -> Result<Self> {
        let mut ssf = Self::build(lags, sigma, false)?;
        let t = ssf.t(0);
        let radius = t
            .clone()
            .complex_eigenvalues()
            .iter()
            .map(|c| c.norm())
            .fold(0.0, f64::max);
        if radius >= 1.0 {
            return Err(SsfError::NonStationary);
        }
        ssf.pstar0 = solve_lyapunov(&t, &ssf.v(0))?;
        Ok(ssf)
    }

    /// Whole initial state diffuse.
    pub fn diffuse(lags: Vec<DMatrix<f64>>, sigma: DMatrix<f64>) -> Result<Self> {
        Self::build(lags, sigma, true)
    }

    fn build(lags: Vec<DMatrix<f64>>, sigma: DMatrix<f64>, diffuse: bool) -> Result<Self> {
        let k = sigma.nrows();
        if !sigma.is_square() {
            return Err(SsfError::DimensionMismatch {
                what: "var innovation covariance",
                expected: k,
                got: sigma.ncols(),
            });
        }
        if lags.is_empty() {
            return Err(SsfError::ModelError("VAR needs at least one lag".into()));
        }
        for a in &lags {
            if a.shape() != (k, k) {
                return Err(SsfError::DimensionMismatch {
                    what: "var lag matrix",
                    expected: k,
                    got: a.nrows(),
                });
            }
        }
        let mut sigma_factor = sigma.clone();
        lcholesky(&mut sigma_factor, CHOLESKY_EPSILON);
        let n = k * lags.len();
        Ok(Self {
            k,
            lags,
            sigma,
            sigma_factor,
            pstar0: DMatrix::zeros(n, n),
            diffuse,
        })
    }

    pub fn n_variables(&self) -> usize {
        self.k
    }

    pub fn n_lags(&self) -> usize {
        self.lags.len()
    }

    /// Each variable observed exactly.
    pub fn into_multivariate(self) -> Result<MultivariateSsf> {
        let (k, n) = (self.k, self.k * self.lags.len());
        let model = Arc::new(self);
        let measurements = (0..k)
            .map(|i| Ok(Measurement::exact(Arc::new(UnitLoading::new(n, i)?))))
            .collect::<Result<Vec<_>>>()?;
        let initialization: Arc<dyn SsfInitialization> = model.clone();
        MultivariateSsf::new(initialization, model, measurements)
    }
}

/// vec(P) = (I - T (x) T)^{-1} vec(V)
fn solve_lyapunov(t: &DMatrix<f64>, v: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = t.nrows();
    let system = DMatrix::identity(n * n, n * n) - t.kronecker(t);
    let rhs = DVector::from_column_slice(v.as_slice());
    let sol = system.lu().solve(&rhs).ok_or(SsfError::NonStationary)?;
    let mut p = DMatrix::from_column_slice(n, n, sol.as_slice());
    symmetrize(&mut p);
    debug!(dim = n, "var stationary covariance");
    Ok(p)
}

impl SsfInitialization for VarSsf {
    fn dim(&self) -> usize {
        self.k * self.lags.len()
    }

    fn diffuse_dim(&self) -> usize {
        if self.diffuse {
            self.k * self.lags.len()
        } else {
            0
        }
    }

    fn pf0(&self) -> DMatrix<f64> {
        self.pstar0.clone()
    }

    fn b(&self) -> DMatrix<f64> {
        let n = SsfInitialization::dim(self);
        if self.diffuse {
            DMatrix::identity(n, n)
        } else {
            DMatrix::zeros(n, 0)
        }
    }
}

impl SsfDynamics for VarSsf {
    fn dim(&self) -> usize {
        self.k * self.lags.len()
    }

    fn t(&self, _pos: usize) -> DMatrix<f64> {
        let (k, p) = (self.k, self.lags.len());
        let mut t = DMatrix::zeros(k * p, k * p);
        for (j, a) in self.lags.iter().enumerate() {
            t.view_mut((0, j * k), (k, k)).copy_from(a);
        }
        for j in 1..p {
            t.view_mut((j * k, (j - 1) * k), (k, k))
                .fill_with_identity();
        }
        t
    }

    fn s(&self, _pos: usize) -> DMatrix<f64> {
        let mut s = DMatrix::zeros(self.k * self.lags.len(), self.k);
        s.view_mut((0, 0), (self.k, self.k))
            .copy_from(&self.sigma_factor);
        s
    }

    fn innovations_dim(&self) -> usize {
        self.k
    }

    fn tx(&self, _pos: usize, x: &mut DVector<f64>) {
        let (k, p) = (self.k, self.lags.len());
        let mut top = DVector::zeros(k);
        for (j, a) in self.lags.iter().enumerate() {
            top.gemv(1.0, a, &x.rows(j * k, k), 1.0);
        }
        for i in (k..k * p).rev() {
            x[i] = x[i - k];
        }
        x.rows_mut(0, k).copy_from(&top);
    }

    fn add_v(&self, _pos: usize, p: &mut DMatrix<f64>) {
        let k = self.k;
        let mut block = p.view_mut((0, 0), (k, k));
        block += &self.sigma;
    }
}
