//! Concentrated likelihood as an argmin cost function.
//!
//! The optimizer works on unconstrained coordinates; every point maps to a
//! stationary and invertible SARIMA model through the Monahan transforms in
//! [`crate::params`]. The innovation variance and the regression
//! coefficients are concentrated out.

use argmin::core::{CostFunction, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use nalgebra::DMatrix;
use tracing::{debug, instrument};

use crate::error::{Result, SsfError};
use crate::likelihood::ConcentratedLikelihood;
use crate::model::ArimaModel;
use crate::params::SarimaParams;
use crate::regression::ConcentratedLikelihoodComputer;
use crate::types::{ArmaFilterKind, SarimaOrder};

/// Cost of a point the model cannot be evaluated at.
pub const INVALID_COST: f64 = f64::MAX / 2.0;

#[derive(Debug, Clone)]
pub struct ArimaObjective {
    order: SarimaOrder,
    y: Vec<f64>,
    x: DMatrix<f64>,
    computer: ConcentratedLikelihoodComputer,
}

impl ArimaObjective {
    pub fn new(order: SarimaOrder, y: Vec<f64>, kind: ArmaFilterKind) -> Result<Self> {
        let n = y.len();
        Self::with_regressors(order, y, DMatrix::zeros(n, 0), kind)
    }

    pub fn with_regressors(
        order: SarimaOrder,
        y: Vec<f64>,
        x: DMatrix<f64>,
        kind: ArmaFilterKind,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(SsfError::DimensionMismatch {
                what: "regression variables",
                expected: y.len(),
                got: x.nrows(),
            });
        }
        if y.len() <= order.k_diff() + order.n_coefficients() {
            return Err(SsfError::DataError(format!(
                "{} observations are too few for {} coefficients after differencing of degree {}",
                y.len(),
                order.n_coefficients(),
                order.k_diff()
            )));
        }
        Ok(Self {
            order,
            y,
            x,
            computer: ConcentratedLikelihoodComputer::new(kind),
        })
    }

    pub fn order(&self) -> &SarimaOrder {
        &self.order
    }

    /// Model at unconstrained coordinates `param`, unit variance.
    pub fn model(&self, param: &[f64]) -> Result<ArimaModel> {
        let params = SarimaParams::constrained(param, &self.order)?;
        ArimaModel::from_sarima(&self.order, &params, 1.0)
    }

    pub fn evaluate(&self, param: &[f64]) -> Result<ConcentratedLikelihood> {
        let model = self.model(param)?;
        self.computer.compute_with(&model, &self.y, &self.x)
    }
}

impl CostFunction for ArimaObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        match self.evaluate(param) {
            Ok(cl) if cl.loglikelihood().is_finite() => Ok(-cl.loglikelihood()),
            _ => Ok(INVALID_COST),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub params: SarimaParams,
    pub likelihood: ConcentratedLikelihood,
    pub n_iter: u64,
    pub converged: bool,
}

impl FitResult {
    pub fn loglikelihood(&self) -> f64 {
        self.likelihood.loglikelihood()
    }

    /// Model at the estimate, variance set to its ML value.
    pub fn model(&self, order: &SarimaOrder) -> Result<ArimaModel> {
        ArimaModel::from_sarima(order, &self.params, self.likelihood.sigma2())
    }
}

/// Initial simplex around `start`: one vertex per coordinate, shifted by 5%
/// (or 0.00025 for coordinates near zero).
fn simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = vec![start.to_vec()];
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[i] += if vertex[i].abs() > 1e-8 {
            vertex[i] * 0.05
        } else {
            0.00025
        };
        vertices.push(vertex);
    }
    vertices
}

/// Minimizes `objective` with Nelder-Mead from the constrained `start`.
#[instrument(skip_all, fields(n_params = start.to_flat().len(), max_iters = max_iters))]
pub fn fit_nelder_mead(objective: ArimaObjective, start: &SarimaParams, max_iters: u64) -> Result<FitResult> {
    let x0 = start.unconstrained();
    if x0.len() != objective.order.n_coefficients() {
        return Err(SsfError::DimensionMismatch {
            what: "starting values",
            expected: objective.order.n_coefficients(),
            got: x0.len(),
        });
    }
    if x0.is_empty() {
        let likelihood = objective.evaluate(&x0)?;
        return Ok(FitResult {
            params: start.clone(),
            likelihood,
            n_iter: 0,
            converged: true,
        });
    }

    let solver = NelderMead::new(simplex(&x0))
        .with_sd_tolerance(1e-6)
        .map_err(|e| SsfError::Optimization(e.to_string()))?;
    let evaluator = objective.clone();
    let result = Executor::new(objective, solver)
        .configure(|state: argmin::core::IterState<Vec<f64>, (), (), (), (), f64>| {
            state.max_iters(max_iters)
        })
        .run()
        .map_err(|e| SsfError::Optimization(format!("Nelder-Mead failed: {e}")))?;

    let state = result.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| SsfError::Optimization("Nelder-Mead: no best parameter found".into()))?
        .clone();
    let n_iter = state.get_iter();
    let reason = state.get_termination_reason();
    let converged = reason == Some(&TerminationReason::SolverConverged)
        || reason == Some(&TerminationReason::TargetCostReached);
    debug!(n_iter, converged, cost = state.get_best_cost(), "nelder-mead finished");

    let likelihood = evaluator.evaluate(&best)?;
    Ok(FitResult {
        params: SarimaParams::constrained(&best, &evaluator.order)?,
        likelihood,
        n_iter,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArmaModel;
    use crate::polynomial::apply_filter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn simulate(model: &ArmaModel, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, model.var.sqrt()).unwrap();
        let burn = 100;
        let e: Vec<f64> = (0..n + burn).map(|_| normal.sample(&mut rng)).collect();
        let mut y = vec![0.0; n + burn];
        for t in 0..n + burn {
            let mut v = 0.0;
            for (j, &c) in model.ma.iter().enumerate() {
                if t >= j {
                    v += c * e[t - j];
                }
            }
            for (i, &c) in model.ar.iter().enumerate().skip(1) {
                if t >= i {
                    v -= c * y[t - i];
                }
            }
            y[t] = v;
        }
        y.split_off(burn)
    }

    #[test]
    fn test_cost_matches_concentrated_likelihood() {
        let model = ArmaModel::new(vec![1.0, -0.5], vec![1.0, 0.3], 1.0).unwrap();
        let y = simulate(&model, 80, 3);
        let objective = ArimaObjective::new(SarimaOrder::new(1, 0, 1, 0, 0, 0, 0), y, ArmaFilterKind::Kalman).unwrap();
        let params = SarimaParams {
            ar: vec![0.5],
            ma: vec![0.3],
            sar: vec![],
            sma: vec![],
        };
        let x = params.unconstrained();
        let cost = objective.cost(&x).unwrap();
        let cl = objective.evaluate(&x).unwrap();
        assert!((cost + cl.loglikelihood()).abs() < 1e-12);
        let m = objective.model(&x).unwrap();
        assert!((m.ar[1] + 0.5).abs() < 1e-12);
        assert!((m.ma[1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_point_costs_penalty() {
        let y: Vec<f64> = (0..30).map(|i| (i as f64).sin()).collect();
        let objective = ArimaObjective::new(SarimaOrder::new(1, 0, 0, 0, 0, 0, 0), y, ArmaFilterKind::Ansley).unwrap();
        assert_eq!(objective.cost(&vec![0.1, 0.2]).unwrap(), INVALID_COST);
    }

    #[test]
    fn test_fit_ar1() {
        let truth = ArmaModel::new(vec![1.0, -0.6], vec![1.0], 1.0).unwrap();
        let y = simulate(&truth, 400, 17);
        let order = SarimaOrder::new(1, 0, 0, 0, 0, 0, 0);
        let objective = ArimaObjective::new(order.clone(), y, ArmaFilterKind::Ansley).unwrap();
        let start = SarimaParams {
            ar: vec![0.1],
            ma: vec![],
            sar: vec![],
            sma: vec![],
        };
        let fit = fit_nelder_mead(objective, &start, 500).unwrap();
        assert!((fit.params.ar[0] - 0.6).abs() < 0.1, "phi = {}", fit.params.ar[0]);
        assert!((fit.likelihood.sigma2() - 1.0).abs() < 0.2);
        let model = fit.model(&order).unwrap();
        assert!((model.var - fit.likelihood.sigma2()).abs() < 1e-15);
    }

    #[test]
    fn test_fit_is_filter_independent() {
        let truth = ArmaModel::new(vec![1.0], vec![1.0, -0.4], 1.0).unwrap();
        let level: Vec<f64> = simulate(&truth, 150, 5)
            .iter()
            .scan(0.0, |s, v| {
                *s += v;
                Some(*s)
            })
            .collect();
        let order = SarimaOrder::new(0, 1, 1, 0, 0, 0, 0);
        let start = SarimaParams {
            ar: vec![],
            ma: vec![-0.1],
            sar: vec![],
            sma: vec![],
        };
        let fits: Vec<FitResult> = [ArmaFilterKind::Kalman, ArmaFilterKind::LjungBox]
            .into_iter()
            .map(|kind| {
                let objective = ArimaObjective::new(order.clone(), level.clone(), kind).unwrap();
                fit_nelder_mead(objective, &start, 500).unwrap()
            })
            .collect();
        assert!((fits[0].params.ma[0] - fits[1].params.ma[0]).abs() < 1e-2);
        assert!((fits[0].loglikelihood() - fits[1].loglikelihood()).abs() < 1e-4);
        assert_eq!(fits[0].likelihood.likelihood.n, apply_filter(&[1.0, -1.0], &level).len());
    }

    #[test]
    fn test_no_free_coefficients() {
        let y: Vec<f64> = (0..20).map(|i| (i as f64 * 0.7).cos()).collect();
        let objective = ArimaObjective::new(SarimaOrder::new(0, 1, 0, 0, 0, 0, 0), y, ArmaFilterKind::Kalman).unwrap();
        let start = SarimaParams {
            ar: vec![],
            ma: vec![],
            sar: vec![],
            sma: vec![],
        };
        let fit = fit_nelder_mead(objective, &start, 10).unwrap();
        assert_eq!(fit.n_iter, 0);
        assert_eq!(fit.likelihood.likelihood.n, 19);
    }

    #[test]
    fn test_too_few_observations() {
        assert!(matches!(
            ArimaObjective::new(SarimaOrder::airline(12), vec![1.0; 14], ArmaFilterKind::Kalman),
            Err(SsfError::DataError(_))
        ));
    }
}
