//! Trend models with a fully diffuse (level, slope) state.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SsfError};
use crate::matrix::symmetric::{lcholesky, CHOLESKY_EPSILON};
use crate::ssf::{Ssf, SsfDynamics, SsfInitialization, UnitLoading};

/// `level_{t+1} = level_t + slope_t + u_t`, `slope_{t+1} = slope_t + w_t`.
#[derive(Debug, Clone)]
pub struct SplineSsf {
    v: DMatrix<f64>,
    s: DMatrix<f64>,
}

impl SplineSsf {
    /// Integrated random walk matching a continuous cubic smoothing spline
    /// sampled at unit spacing.
    pub fn cubic(var: f64) -> Result<Self> {
        check(var)?;
        let v = DMatrix::from_row_slice(2, 2, &[var / 3.0, var / 2.0, var / 2.0, var]);
        Ok(Self::from_covariance(v))
    }

    /// Local linear trend with independent level and slope disturbances.
    pub fn local_linear_trend(level_var: f64, slope_var: f64) -> Result<Self> {
        if level_var != 0.0 {
            check(level_var)?;
        }
        check(slope_var)?;
        let v = DMatrix::from_row_slice(2, 2, &[level_var, 0.0, 0.0, slope_var]);
        Ok(Self::from_covariance(v))
    }

    fn from_covariance(v: DMatrix<f64>) -> Self {
        let mut s = v.clone();
        lcholesky(&mut s, CHOLESKY_EPSILON);
        Self { v, s }
    }

    /// Trend observed with measurement noise of variance `noise_var`.
    pub fn into_ssf(self, noise_var: f64) -> Result<Ssf> {
        Ssf::from_model(Arc::new(self), Arc::new(UnitLoading::new(2, 0)?), noise_var)
    }
}

fn check(var: f64) -> Result<()> {
    if !(var > 0.0) || !var.is_finite() {
        return Err(SsfError::InvalidVariance(var));
    }
    Ok(())
}

impl SsfInitialization for SplineSsf {
    fn dim(&self) -> usize {
        2
    }

    fn diffuse_dim(&self) -> usize {
        2
    }

    fn pf0(&self) -> DMatrix<f64> {
        DMatrix::zeros(2, 2)
    }

    fn b(&self) -> DMatrix<f64> {
        DMatrix::identity(2, 2)
    }
}

impl SsfDynamics for SplineSsf {
    fn dim(&self) -> usize {
        2
    }

    fn t(&self, _pos: usize) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0])
    }

    fn s(&self, _pos: usize) -> DMatrix<f64> {
        self.s.clone()
    }

    fn innovations_dim(&self) -> usize {
        2
    }

    fn v(&self, _pos: usize) -> DMatrix<f64> {
        self.v.clone()
    }

    fn tx(&self, _pos: usize, x: &mut DVector<f64>) {
        x[0] += x[1];
    }

    fn xt(&self, _pos: usize, x: &mut DVector<f64>) {
        x[1] += x[0];
    }

    fn add_v(&self, _pos: usize, p: &mut DMatrix<f64>) {
        *p += &self.v;
    }
}
