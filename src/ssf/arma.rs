//! Stationary ARMA process in forecast form.
//!
//! State: `alpha_t = [y_t, y_{t+1|t}, ..., y_{t+r-1|t}]`, `r = max(p, q + 1)`.
//! `T` is a companion matrix (ones on the superdiagonal, AR coefficients on
//! the last row), the noise loads on the psi-weights and `Z = e_0`.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SsfError};
use crate::model::ArmaModel;
use crate::ssf::{Ssf, SsfDynamics, SsfInitialization, UnitLoading};

#[derive(Debug, Clone)]
pub struct ArmaSsf {
    dim: usize,
    /// phi_1..phi_r, zero-padded.
    phi: Vec<f64>,
    /// sigma * psi_0..psi_{r-1}
    s: DVector<f64>,
    pstar0: DMatrix<f64>,
}

impl ArmaSsf {
    pub fn new(model: &ArmaModel) -> Result<Self> {
        if !model.is_stationary() {
            return Err(SsfError::NonStationary);
        }
        let r = model.state_dim();
        let mut phi = vec![0.0; r];
        for (i, &c) in model.ar.iter().enumerate().skip(1) {
            if i <= r {
                phi[i - 1] = -c;
            }
        }
        let psi = model.psi_weights(r);
        let sigma = model.var.sqrt();
        let s = DVector::from_iterator(r, psi.iter().map(|&w| sigma * w));
        let pstar0 = stationary_covariance(model, &psi)?;
        Ok(Self {
            dim: r,
            phi,
            s,
            pstar0,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Univariate model observed without error.
    pub fn into_ssf(self) -> Result<Ssf> {
        let dim = self.dim;
        Ssf::from_model(Arc::new(self), Arc::new(UnitLoading::new(dim, 0)?), 0.0)
    }

    /// Applies the companion transition to the block `x[offset..offset+r]`.
    pub(crate) fn tx_block(&self, x: &mut DVector<f64>, offset: usize) {
        let r = self.dim;
        let last = (0..r).map(|k| self.phi[r - 1 - k] * x[offset + k]).sum::<f64>();
        for i in 0..r - 1 {
            x[offset + i] = x[offset + i + 1];
        }
        x[offset + r - 1] = last;
    }

    /// x' T on the block `x[offset..offset+r]`.
    pub(crate) fn xt_block(&self, x: &mut DVector<f64>, offset: usize) {
        let r = self.dim;
        let xl = x[offset + r - 1];
        for k in (1..r).rev() {
            x[offset + k] = x[offset + k - 1] + xl * self.phi[r - 1 - k];
        }
        x[offset] = xl * self.phi[r - 1];
    }

    pub(crate) fn transition_block(&self) -> DMatrix<f64> {
        let r = self.dim;
        let mut t = DMatrix::zeros(r, r);
        for i in 0..r - 1 {
            t[(i, i + 1)] = 1.0;
        }
        for k in 0..r {
            t[(r - 1, k)] = self.phi[r - 1 - k];
        }
        t
    }

    pub(crate) fn noise_block(&self) -> &DVector<f64> {
        &self.s
    }

    pub(crate) fn covariance_block(&self) -> &DMatrix<f64> {
        &self.pstar0
    }
}

/// Cov(y_{t+i|t}, y_{t+j|t}) = gamma(j - i) - var * sum_{k<i} psi_k psi_{k+j-i}, i <= j.
fn stationary_covariance(model: &ArmaModel, psi: &[f64]) -> Result<DMatrix<f64>> {
    let r = psi.len();
    let gamma = model.autocovariances(r)?;
    let mut p = DMatrix::zeros(r, r);
    for i in 0..r {
        for j in i..r {
            let mut v = gamma[j - i];
            for k in 0..i {
                v -= model.var * psi[k] * psi[k + j - i];
            }
            p[(i, j)] = v;
            p[(j, i)] = v;
        }
    }
    Ok(p)
}

impl SsfInitialization for ArmaSsf {
    fn dim(&self) -> usize {
        self.dim
    }

    fn pf0(&self) -> DMatrix<f64> {
        self.pstar0.clone()
    }
}

impl SsfDynamics for ArmaSsf {
    fn dim(&self) -> usize {
        self.dim
    }

    fn t(&self, _pos: usize) -> DMatrix<f64> {
        self.transition_block()
    }

    fn s(&self, _pos: usize) -> DMatrix<f64> {
        DMatrix::from_column_slice(self.dim, 1, self.s.as_slice())
    }

    fn innovations_dim(&self) -> usize {
        1
    }

    fn v(&self, _pos: usize) -> DMatrix<f64> {
        &self.s * self.s.transpose()
    }

    fn tx(&self, _pos: usize, x: &mut DVector<f64>) {
        self.tx_block(x, 0);
    }

    fn xt(&self, _pos: usize, x: &mut DVector<f64>) {
        self.xt_block(x, 0);
    }

    fn add_v(&self, _pos: usize, p: &mut DMatrix<f64>) {
        p.ger(1.0, &self.s, &self.s, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::distance;

    fn arma22() -> ArmaModel {
        ArmaModel::new(vec![1.0, -0.5, 0.2], vec![1.0, 0.4, -0.3], 1.7).unwrap()
    }

    #[test]
    fn test_pstar0_is_stationary_solution() {
        for model in [
            arma22(),
            ArmaModel::new(vec![1.0, -0.9], vec![1.0], 1.0).unwrap(),
            ArmaModel::new(vec![1.0], vec![1.0, 0.6, 0.1, -0.2], 0.5).unwrap(),
        ] {
            let ssf = ArmaSsf::new(&model).unwrap();
            let p = ssf.pf0();
            let mut next = p.clone();
            ssf.tvt(0, &mut next);
            ssf.add_v(0, &mut next);
            assert!(distance(&p, &next) < 1e-10, "P0 != T P0 T' + V");
            let gamma = model.autocovariances(1).unwrap();
            assert!((p[(0, 0)] - gamma[0]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_functional_transition_matches_matrix() {
        let ssf = ArmaSsf::new(&arma22()).unwrap();
        let t = ssf.t(0);
        let x = DVector::from_vec(vec![0.3, -1.2, 2.5]);
        let mut tx = x.clone();
        ssf.tx(0, &mut tx);
        assert!((tx - &t * &x).amax() < 1e-14);
        let mut xt = x.clone();
        ssf.xt(0, &mut xt);
        assert!((xt - t.transpose() * &x).amax() < 1e-14);
    }

    #[test]
    fn test_non_stationary_rejected() {
        let model = ArmaModel::new(vec![1.0, -1.0], vec![1.0], 1.0).unwrap();
        assert_eq!(ArmaSsf::new(&model).unwrap_err(), SsfError::NonStationary);
    }

    #[test]
    fn test_white_noise() {
        let ssf = ArmaSsf::new(&ArmaModel::white_noise()).unwrap();
        assert_eq!(ssf.dim(), 1);
        assert_eq!(ssf.pf0()[(0, 0)], 1.0);
        let mut x = DVector::from_vec(vec![3.0]);
        ssf.tx(0, &mut x);
        assert_eq!(x[0], 0.0);
    }
}
