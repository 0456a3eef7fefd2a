//! ARIMA model in state-space form.
//!
//! State equation:  alpha_{t+1} = T * alpha_t + S * eta_t
//! Observation:     y_t          = Z * alpha_t
//!
//! The state stacks the `d = deg(diff)` lagged levels `y_{t-1}, ..., y_{t-d}`
//! on top of the forecast-form ARMA block of the differenced series
//! `w_t = diff(L) y_t`:
//!
//!   y_t = delta_1 y_{t-1} + ... + delta_d y_{t-d} + w_t,   delta_i = -diff_i
//!
//! The lagged levels are diffuse (`B = [I_d; 0]`); the ARMA block starts from
//! its stationary covariance.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::model::ArimaModel;
use crate::ssf::arma::ArmaSsf;
use crate::ssf::{block_diagonal, FixedLoading, Ssf, SsfDynamics, SsfInitialization};

#[derive(Debug, Clone)]
pub struct ArimaSsf {
    arma: ArmaSsf,
    /// delta_1..delta_d
    delta: Vec<f64>,
}

impl ArimaSsf {
    pub fn new(model: &ArimaModel) -> Result<Self> {
        let arma = ArmaSsf::new(&model.stationary())?;
        let delta = model.diff.iter().skip(1).map(|&c| -c).collect::<Vec<_>>();
        let d = model.k_diff();
        Ok(Self {
            arma,
            delta: delta[..d].to_vec(),
        })
    }

    pub fn k_diff(&self) -> usize {
        self.delta.len()
    }

    pub fn k_arma(&self) -> usize {
        self.arma.dim()
    }

    pub fn design(&self) -> DVector<f64> {
        let d = self.k_diff();
        let mut z = DVector::zeros(d + self.k_arma());
        for (i, &c) in self.delta.iter().enumerate() {
            z[i] = c;
        }
        z[d] = 1.0;
        z
    }

    pub fn into_ssf(self) -> Result<Ssf> {
        let z = self.design();
        Ssf::from_model(Arc::new(self), Arc::new(FixedLoading::new(z)), 0.0)
    }

    fn level(&self, x: &DVector<f64>) -> f64 {
        let d = self.k_diff();
        self.delta.iter().zip(x.iter()).map(|(c, v)| c * v).sum::<f64>() + x[d]
    }
}

/// Builds the state-space form of an ARIMA model.
pub fn ssf(model: &ArimaModel) -> Result<Ssf> {
    ArimaSsf::new(model)?.into_ssf()
}

impl SsfInitialization for ArimaSsf {
    fn dim(&self) -> usize {
        self.k_diff() + self.k_arma()
    }

    fn diffuse_dim(&self) -> usize {
        self.k_diff()
    }

    fn pf0(&self) -> DMatrix<f64> {
        let d = self.k_diff();
        block_diagonal(&DMatrix::zeros(d, d), self.arma.covariance_block())
    }

    fn b(&self) -> DMatrix<f64> {
        let d = self.k_diff();
        let mut b = DMatrix::zeros(d + self.k_arma(), d);
        for i in 0..d {
            b[(i, i)] = 1.0;
        }
        b
    }
}

impl SsfDynamics for ArimaSsf {
    fn dim(&self) -> usize {
        self.k_diff() + self.k_arma()
    }

    /// Structure:
    /// 1. First row: the current level `Z alpha_t` enters the lag block
    /// 2. Lag block shift below it
    /// 3. ARMA companion block `[d.., d..]`
    fn t(&self, _pos: usize) -> DMatrix<f64> {
        let d = self.k_diff();
        let n = d + self.k_arma();
        let mut t = DMatrix::zeros(n, n);
        if d > 0 {
            for (i, &c) in self.delta.iter().enumerate() {
                t[(0, i)] = c;
            }
            t[(0, d)] = 1.0;
            for i in 1..d {
                t[(i, i - 1)] = 1.0;
            }
        }
        t.view_mut((d, d), (self.k_arma(), self.k_arma()))
            .copy_from(&self.arma.transition_block());
        t
    }

    fn s(&self, _pos: usize) -> DMatrix<f64> {
        let d = self.k_diff();
        let mut s = DMatrix::zeros(d + self.k_arma(), 1);
        s.view_mut((d, 0), (self.k_arma(), 1))
            .copy_from(self.arma.noise_block());
        s
    }

    fn innovations_dim(&self) -> usize {
        1
    }

    fn tx(&self, _pos: usize, x: &mut DVector<f64>) {
        let d = self.k_diff();
        if d > 0 {
            let y = self.level(x);
            for i in (1..d).rev() {
                x[i] = x[i - 1];
            }
            x[0] = y;
        }
        self.arma.tx_block(x, d);
    }

    fn xt(&self, _pos: usize, x: &mut DVector<f64>) {
        let d = self.k_diff();
        if d == 0 {
            self.arma.xt_block(x, 0);
            return;
        }
        let x0 = x[0];
        // ARMA block first: it only reads its own entries
        self.arma.xt_block(x, d);
        x[d] += x0;
        for i in 0..d {
            let next = if i + 1 < d { x[i + 1] } else { 0.0 };
            x[i] = next + x0 * self.delta[i];
        }
    }

    fn add_v(&self, _pos: usize, p: &mut DMatrix<f64>) {
        let d = self.k_diff();
        let r = self.k_arma();
        let s = self.arma.noise_block();
        p.view_mut((d, d), (r, r)).ger(1.0, s, s, 1.0);
    }
}
