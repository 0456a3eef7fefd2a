//! ARMA / ARIMA model descriptions in lag-polynomial form.
//!
//! Polynomials are coefficient vectors in powers of the lag operator with a
//! leading 1: `ar(L) x_t = ma(L) e_t`, `Var(e_t) = var`.

use crate::error::{Result, SsfError};
use crate::params::SarimaParams;
use crate::polynomial::{
    autocovariances, degree, differencing_poly, is_stationary, make_ar_poly, make_ma_poly,
    make_seasonal_ar_poly, make_seasonal_ma_poly, polymul, psi_weights,
};
use crate::types::SarimaOrder;

/// Stationary ARMA process.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmaModel {
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub var: f64,
}

impl ArmaModel {
    pub fn new(ar: Vec<f64>, ma: Vec<f64>, var: f64) -> Result<Self> {
        if ar.first().copied() != Some(1.0) || ma.first().copied() != Some(1.0) {
            return Err(SsfError::ModelError(
                "AR and MA polynomials must start with 1".into(),
            ));
        }
        if !(var > 0.0) || !var.is_finite() {
            return Err(SsfError::InvalidVariance(var));
        }
        Ok(Self { ar, ma, var })
    }

    /// White noise with unit variance.
    pub fn white_noise() -> Self {
        Self {
            ar: vec![1.0],
            ma: vec![1.0],
            var: 1.0,
        }
    }

    pub fn p(&self) -> usize {
        degree(&self.ar)
    }

    pub fn q(&self) -> usize {
        degree(&self.ma)
    }

    /// State dimension of the forecast-form representation: max(p, q + 1).
    pub fn state_dim(&self) -> usize {
        std::cmp::max(self.p(), self.q() + 1)
    }

    pub fn is_stationary(&self) -> bool {
        is_stationary(&self.ar)
    }

    pub fn autocovariances(&self, n: usize) -> Result<Vec<f64>> {
        autocovariances(&self.ar, &self.ma, self.var, n)
    }

    pub fn psi_weights(&self, n: usize) -> Vec<f64> {
        psi_weights(&self.ar, &self.ma, n)
    }
}

/// ARIMA process: `ar(L) diff(L) y_t = ma(L) e_t`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArimaModel {
    pub ar: Vec<f64>,
    pub diff: Vec<f64>,
    pub ma: Vec<f64>,
    pub var: f64,
}

impl ArimaModel {
    pub fn new(ar: Vec<f64>, diff: Vec<f64>, ma: Vec<f64>, var: f64) -> Result<Self> {
        if diff.first().copied() != Some(1.0) {
            return Err(SsfError::ModelError(
                "differencing polynomial must start with 1".into(),
            ));
        }
        let stationary = ArmaModel::new(ar, ma, var)?;
        Ok(Self {
            ar: stationary.ar,
            diff,
            ma: stationary.ma,
            var,
        })
    }

    /// Expands the seasonal order and coefficients into lag polynomials.
    pub fn from_sarima(order: &SarimaOrder, params: &SarimaParams, var: f64) -> Result<Self> {
        if params.ar.len() != order.p
            || params.ma.len() != order.q
            || params.sar.len() != order.pp
            || params.sma.len() != order.qq
        {
            return Err(SsfError::DimensionMismatch {
                what: "sarima parameters",
                expected: order.n_coefficients(),
                got: params.to_flat().len(),
            });
        }
        if (order.pp > 0 || order.dd > 0 || order.qq > 0) && order.s < 2 {
            return Err(SsfError::ModelError(format!(
                "seasonal terms require a seasonal period s >= 2, got s={}",
                order.s
            )));
        }
        let ar = polymul(
            &make_ar_poly(&params.ar, order.p),
            &make_seasonal_ar_poly(&params.sar, order.s),
        );
        let ma = polymul(
            &make_ma_poly(&params.ma, order.q),
            &make_seasonal_ma_poly(&params.sma, order.s),
        );
        let diff = differencing_poly(order.d, order.dd, order.s);
        Self::new(ar, diff, ma, var)
    }

    /// Airline model (0,1,1)(0,1,1)s with `ma = (1 + theta L)(1 + btheta L^s)`.
    pub fn airline(s: usize, theta: f64, btheta: f64) -> Result<Self> {
        let params = SarimaParams {
            ar: vec![],
            ma: vec![theta],
            sar: vec![],
            sma: vec![btheta],
        };
        Self::from_sarima(&SarimaOrder::airline(s), &params, 1.0)
    }

    /// Degree of the differencing polynomial, i.e. the number of diffuse states.
    pub fn k_diff(&self) -> usize {
        degree(&self.diff)
    }

    pub fn full_ar(&self) -> Vec<f64> {
        polymul(&self.ar, &self.diff)
    }

    /// Model of the time-reversed series. A Gaussian ARIMA process and its
    /// reversal share the same polynomials, which is what backcasting relies on.
    pub fn reversed(&self) -> Self {
        self.clone()
    }

    pub fn stationary(&self) -> ArmaModel {
        ArmaModel {
            ar: self.ar.clone(),
            ma: self.ma.clone(),
            var: self.var,
        }
    }
}

impl From<ArmaModel> for ArimaModel {
    fn from(m: ArmaModel) -> Self {
        Self {
            ar: m.ar,
            diff: vec![1.0],
            ma: m.ma,
            var: m.var,
        }
    }
}
