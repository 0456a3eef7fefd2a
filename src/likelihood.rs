//! Gaussian likelihood ingredients and the regression (concentrated) likelihood.

use std::f64::consts::PI;
use std::sync::OnceLock;

use nalgebra::{DMatrix, DVector};

use crate::matrix::symmetric::xtx;
use crate::matrix::triangular::inverse_lower;

/// Log-determinant and sum of squares of a prediction-error decomposition.
///
/// `n` counts the observations that entered `ssq`; the `nd` diffuse steps
/// only contribute `diffuse_logdet`.
#[derive(Debug, Clone, PartialEq)]
pub struct Likelihood {
    pub n: usize,
    pub logdet: f64,
    pub ssq: f64,
    pub diffuse_logdet: f64,
    pub nd: usize,
}

impl Likelihood {
    pub fn new(n: usize, logdet: f64, ssq: f64) -> Self {
        Self {
            n,
            logdet,
            ssq,
            diffuse_logdet: 0.0,
            nd: 0,
        }
    }

    /// ML estimate of the scale factor.
    pub fn sigma2(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        self.ssq / self.n as f64
    }

    /// Log-likelihood with the scale concentrated out:
    ///   -0.5 * (n ln 2pi + n ln(ssq/n) + n + logdet + diffuse_logdet)
    pub fn loglikelihood(&self) -> f64 {
        let n = self.n as f64;
        -0.5 * (n * (2.0 * PI).ln() + n * self.sigma2().ln() + n + self.logdet + self.diffuse_logdet)
    }

    /// Log-likelihood at the scale built into the model:
    ///   -0.5 * (n ln 2pi + logdet + diffuse_logdet + ssq)
    pub fn raw_loglikelihood(&self) -> f64 {
        let n = self.n as f64;
        -0.5 * (n * (2.0 * PI).ln() + self.logdet + self.diffuse_logdet + self.ssq)
    }

    /// `nparams` counts every estimated parameter, the scale included.
    pub fn aic(&self, nparams: usize) -> f64 {
        -2.0 * self.loglikelihood() + 2.0 * nparams as f64
    }

    pub fn bic(&self, nparams: usize) -> f64 {
        -2.0 * self.loglikelihood() + nparams as f64 * (self.n as f64).ln()
    }
}

/// Likelihood of a linear regression with correlated errors, the
/// coefficients and the scale concentrated out.
#[derive(Debug, Clone)]
pub struct ConcentratedLikelihood {
    pub likelihood: Likelihood,
    pub coefficients: DVector<f64>,
    pub residuals: Vec<f64>,
    /// Lower Cholesky factor of the whitened regressors' cross-product.
    pub cholesky: DMatrix<f64>,
    pub rank: usize,
    unscaled_covariance: OnceLock<DMatrix<f64>>,
}

impl ConcentratedLikelihood {
    pub fn new(
        likelihood: Likelihood,
        coefficients: DVector<f64>,
        residuals: Vec<f64>,
        cholesky: DMatrix<f64>,
        rank: usize,
    ) -> Self {
        Self {
            likelihood,
            coefficients,
            residuals,
            cholesky,
            rank,
            unscaled_covariance: OnceLock::new(),
        }
    }

    pub fn nx(&self) -> usize {
        self.coefficients.len()
    }

    pub fn loglikelihood(&self) -> f64 {
        self.likelihood.loglikelihood()
    }

    pub fn sigma2(&self) -> f64 {
        self.likelihood.sigma2()
    }

    /// (X'X)^{-1} of the whitened regressors; computed on first access and
    /// shared by every later caller, from any thread.
    pub fn unscaled_covariance(&self) -> &DMatrix<f64> {
        self.unscaled_covariance.get_or_init(|| {
            // (LL')^{-1} = L^{-T} L^{-1}
            xtx(&inverse_lower(&self.cholesky))
        })
    }

    pub fn covariance(&self) -> DMatrix<f64> {
        self.unscaled_covariance() * self.sigma2()
    }

    pub fn standard_errors(&self) -> Vec<f64> {
        let cov = self.covariance();
        (0..cov.nrows()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect()
    }
}
