//! Cholette-Dagum benchmarking.
//!
//! The benchmarked series is `x_t = s_t + w_t e_t` with `e_t` an AR(1)
//! (`rho = 1` gives a diffuse random walk) and weights `w_t = |s_t|^lambda`.
//! The discrepancies between the benchmarks and the period sums of `s` are
//! observed through the cumulator, and `w_t e_t` is recovered by smoothing.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::instrument;

use crate::error::{Result, SsfError};
use crate::ssf::cumulator::disaggregate;
use crate::ssf::{Ssf, SsfDynamics, SsfInitialization, SsfLoading};

#[derive(Debug, Clone)]
pub struct CholetteSsf {
    rho: f64,
}

impl CholetteSsf {
    pub fn new(rho: f64) -> Result<Self> {
        if !(rho.abs() <= 1.0) {
            return Err(SsfError::ModelError(format!(
                "benchmarking requires |rho| <= 1, got {rho}"
            )));
        }
        Ok(Self { rho })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    fn is_diffuse(&self) -> bool {
        self.rho.abs() == 1.0
    }

    /// Error process observed through `weights[t] * e_t`, without noise.
    pub fn into_ssf(self, weights: Vec<f64>) -> Result<Ssf> {
        Ssf::from_model(Arc::new(self), Arc::new(WeightedLoading { weights }), 0.0)
    }
}

impl SsfInitialization for CholetteSsf {
    fn dim(&self) -> usize {
        1
    }

    fn diffuse_dim(&self) -> usize {
        usize::from(self.is_diffuse())
    }

    fn pf0(&self) -> DMatrix<f64> {
        let var = if self.is_diffuse() {
            0.0
        } else {
            1.0 / (1.0 - self.rho * self.rho)
        };
        DMatrix::from_element(1, 1, var)
    }

    fn b(&self) -> DMatrix<f64> {
        DMatrix::from_element(1, self.diffuse_dim(), 1.0)
    }
}

impl SsfDynamics for CholetteSsf {
    fn dim(&self) -> usize {
        1
    }

    fn t(&self, _pos: usize) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, self.rho)
    }

    fn s(&self, _pos: usize) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, 1.0)
    }

    fn innovations_dim(&self) -> usize {
        1
    }

    fn tx(&self, _pos: usize, x: &mut DVector<f64>) {
        x[0] *= self.rho;
    }

    fn xt(&self, _pos: usize, x: &mut DVector<f64>) {
        x[0] *= self.rho;
    }

    fn add_v(&self, _pos: usize, p: &mut DMatrix<f64>) {
        p[(0, 0)] += 1.0;
    }
}

/// Scalar state loaded with a time-varying weight; zero beyond the weights.
struct WeightedLoading {
    weights: Vec<f64>,
}

impl WeightedLoading {
    fn weight(&self, pos: usize) -> f64 {
        self.weights.get(pos).copied().unwrap_or(0.0)
    }
}

impl SsfLoading for WeightedLoading {
    fn is_time_invariant(&self) -> bool {
        false
    }

    fn z(&self, pos: usize) -> DVector<f64> {
        DVector::from_element(1, self.weight(pos))
    }

    fn zx(&self, pos: usize, x: &DVector<f64>) -> f64 {
        self.weight(pos) * x[0]
    }

    fn zvz(&self, pos: usize, v: &DMatrix<f64>) -> f64 {
        let w = self.weight(pos);
        w * w * v[(0, 0)]
    }
}

/// Adjusts `series` so that its sums over consecutive blocks of
/// `conversion` values match `benchmarks`. `lambda = 0` spreads the
/// discrepancies additively, `lambda = 1` proportionally to the series.
#[instrument(skip_all, fields(n = series.len(), conversion = conversion, rho = rho, lambda = lambda))]
pub fn benchmark(
    series: &[f64],
    benchmarks: &[f64],
    conversion: usize,
    rho: f64,
    lambda: f64,
) -> Result<Vec<f64>> {
    let n = series.len();
    if benchmarks.len() * conversion > n {
        return Err(SsfError::DataError(format!(
            "{} benchmarks need {} values, got {n}",
            benchmarks.len(),
            benchmarks.len() * conversion
        )));
    }
    let weights: Vec<f64> = series.iter().map(|s| s.abs().powf(lambda)).collect();
    let discrepancies: Vec<f64> = benchmarks
        .iter()
        .enumerate()
        .map(|(i, b)| b - series[i * conversion..(i + 1) * conversion].iter().sum::<f64>())
        .collect();
    let inner = CholetteSsf::new(rho)?.into_ssf(weights)?;
    let corrections = disaggregate(inner, &discrepancies, conversion, n)?;
    Ok(series.iter().zip(&corrections).map(|(s, c)| s + c).collect())
}
