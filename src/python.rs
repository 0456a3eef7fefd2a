//! Python bindings (feature `python`).

use numpy::PyReadonlyArray1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::batch;
use crate::error::SsfError;
use crate::filter::{DiffuseFilter, DiffuseSmoother};
use crate::forecast;
use crate::model::ArimaModel;
use crate::objective::{fit_nelder_mead, ArimaObjective};
use crate::params::SarimaParams;
use crate::regression::{ConcentratedLikelihoodComputer, RegArimaModel};
use crate::ssf::arima;
use crate::types::{ArmaFilterKind, FilterConfig, SarimaOrder, Storage};

impl From<SsfError> for PyErr {
    fn from(e: SsfError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

fn sarima_order(order: (usize, usize, usize), seasonal: (usize, usize, usize, usize)) -> SarimaOrder {
    let (p, d, q) = order;
    let (pp, dd, qq, s) = seasonal;
    SarimaOrder::new(p, d, q, pp, dd, qq, s)
}

fn build_model(order: &SarimaOrder, params: &[f64], var: f64) -> PyResult<ArimaModel> {
    let sparams = SarimaParams::from_flat(params, order)?;
    Ok(ArimaModel::from_sarima(order, &sparams, var)?)
}

/// Model with the variance set to its ML estimate on `y`.
fn scaled_model(order: &SarimaOrder, params: &[f64], y: &[f64]) -> PyResult<ArimaModel> {
    let mut model = build_model(order, params, 1.0)?;
    let cl = ConcentratedLikelihoodComputer::default()
        .compute(&RegArimaModel::without_regressors(y.to_vec(), model.clone()))?;
    model.var = cl.sigma2();
    Ok(model)
}

/// Smoke-test function: returns the version string.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Concentrated log-likelihood of a SARIMA model.
///
/// Returns a dict with: loglike, sigma2, logdet, ssq, n_obs, aic, bic.
#[pyfunction]
#[pyo3(signature = (y, order, seasonal, params, method="kalman"))]
fn arima_loglike<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (usize, usize, usize),
    seasonal: (usize, usize, usize, usize),
    params: PyReadonlyArray1<'py, f64>,
    method: &str,
) -> PyResult<Py<PyDict>> {
    let sorder = sarima_order(order, seasonal);
    let model = build_model(&sorder, params.as_slice()?, 1.0)?;
    let computer = ConcentratedLikelihoodComputer::new(method.parse::<ArmaFilterKind>()?);
    let cl = computer.compute(&RegArimaModel::without_regressors(y.as_slice()?.to_vec(), model))?;
    let ll = &cl.likelihood;
    let k = sorder.n_coefficients() + 1;

    let dict = PyDict::new(py);
    dict.set_item("loglike", ll.loglikelihood())?;
    dict.set_item("sigma2", ll.sigma2())?;
    dict.set_item("logdet", ll.logdet)?;
    dict.set_item("ssq", ll.ssq)?;
    dict.set_item("n_obs", ll.n)?;
    dict.set_item("aic", ll.aic(k))?;
    dict.set_item("bic", ll.bic(k))?;
    Ok(dict.into())
}

/// Fit a SARIMA model by Nelder-Mead on the concentrated likelihood.
///
/// Returns a dict with: params, loglike, sigma2, n_iter, converged.
#[pyfunction]
#[pyo3(signature = (y, order, seasonal, start_params=None, method="kalman", maxiter=500))]
fn arima_fit<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (usize, usize, usize),
    seasonal: (usize, usize, usize, usize),
    start_params: Option<PyReadonlyArray1<'py, f64>>,
    method: &str,
    maxiter: u64,
) -> PyResult<Py<PyDict>> {
    let sorder = sarima_order(order, seasonal);
    let start = match start_params {
        Some(sp) => SarimaParams::from_flat(sp.as_slice()?, &sorder)?,
        None => SarimaParams::from_flat(&vec![0.0; sorder.n_coefficients()], &sorder)?,
    };
    let objective = ArimaObjective::new(sorder, y.as_slice()?.to_vec(), method.parse::<ArmaFilterKind>()?)?;
    let fit = fit_nelder_mead(objective, &start, maxiter)?;

    let dict = PyDict::new(py);
    dict.set_item("params", fit.params.to_flat())?;
    dict.set_item("loglike", fit.loglikelihood())?;
    dict.set_item("sigma2", fit.likelihood.sigma2())?;
    dict.set_item("n_iter", fit.n_iter)?;
    dict.set_item("converged", fit.converged)?;
    Ok(dict.into())
}

/// Forecasts (or backcasts) at the ML scale.
///
/// Returns a dict with: mean, variance, ci_lower, ci_upper.
#[pyfunction]
#[pyo3(signature = (y, order, seasonal, params, steps=12, alpha=0.05, exact=true, backcast=false))]
#[allow(clippy::too_many_arguments)]
fn arima_forecast<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (usize, usize, usize),
    seasonal: (usize, usize, usize, usize),
    params: PyReadonlyArray1<'py, f64>,
    steps: usize,
    alpha: f64,
    exact: bool,
    backcast: bool,
) -> PyResult<Py<PyDict>> {
    if steps > 10_000 {
        return Err(PyValueError::new_err(format!("steps must be <= 10000, got {steps}")));
    }
    let endog = y.as_slice()?;
    let model = scaled_model(&sarima_order(order, seasonal), params.as_slice()?, endog)?;
    let result = match (exact, backcast) {
        (true, false) => forecast::exact_forecasts(&model, endog, steps),
        (true, true) => forecast::exact_backcasts(&model, endog, steps),
        (false, false) => forecast::fast_forecasts(&model, endog, steps),
        (false, true) => forecast::fast_backcasts(&model, endog, steps),
    }?
    .with_intervals(alpha)?;

    let dict = PyDict::new(py);
    dict.set_item("mean", result.mean)?;
    dict.set_item("variance", result.variance)?;
    dict.set_item("ci_lower", result.ci_lower)?;
    dict.set_item("ci_upper", result.ci_upper)?;
    Ok(dict.into())
}

/// Smoothed series of a SARIMA model; missing values (NaN) are interpolated.
///
/// Returns a dict with: signal, signal_variance, loglike (None when the
/// diffuse part is not identified).
#[pyfunction]
fn ssf_smooth_arima<'py>(
    py: Python<'py>,
    y: PyReadonlyArray1<'py, f64>,
    order: (usize, usize, usize),
    seasonal: (usize, usize, usize, usize),
    params: PyReadonlyArray1<'py, f64>,
) -> PyResult<Py<PyDict>> {
    let endog = y.as_slice()?;
    let model = build_model(&sarima_order(order, seasonal), params.as_slice()?, 1.0)?;
    let ssf = arima::ssf(&model)?;
    let config = FilterConfig::default().with_storage(Storage::Full);
    let filtered = DiffuseFilter::new(config.clone()).process(&ssf, endog)?;
    let smoothed = DiffuseSmoother::new(config).smooth(&ssf, &filtered)?;
    let scale = filtered.likelihood().map_or(1.0, |ll| ll.sigma2());

    let dict = PyDict::new(py);
    dict.set_item("signal", smoothed.signal(&ssf))?;
    dict.set_item(
        "signal_variance",
        smoothed
            .signal_variance(&ssf)
            .into_iter()
            .map(|v| v * scale)
            .collect::<Vec<f64>>(),
    )?;
    dict.set_item("loglike", filtered.likelihood().map(|ll| ll.loglikelihood()))?;
    Ok(dict.into())
}

/// Concentrated log-likelihoods of several series under one model, in parallel.
#[pyfunction]
#[pyo3(signature = (series, order, seasonal, params, method="kalman"))]
fn arima_batch_loglike(
    series: Vec<Vec<f64>>,
    order: (usize, usize, usize),
    seasonal: (usize, usize, usize, usize),
    params: Vec<f64>,
    method: &str,
) -> PyResult<Vec<Option<f64>>> {
    let model = build_model(&sarima_order(order, seasonal), &params, 1.0)?;
    Ok(batch::batch_loglike(&series, &model, method.parse::<ArmaFilterKind>()?)
        .into_iter()
        .map(|r| r.ok().map(|ll| ll.loglikelihood()))
        .collect())
}

#[pymodule]
fn ssf_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(arima_loglike, m)?)?;
    m.add_function(wrap_pyfunction!(arima_fit, m)?)?;
    m.add_function(wrap_pyfunction!(arima_forecast, m)?)?;
    m.add_function(wrap_pyfunction!(ssf_smooth_arima, m)?)?;
    m.add_function(wrap_pyfunction!(arima_batch_loglike, m)?)?;
    Ok(())
}
