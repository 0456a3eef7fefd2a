//! Rayon-based parallel batch processing for multiple time series.
//!
//! Every task owns its filter; the series and the model are only read.

use rayon::prelude::*;
use tracing::instrument;

use crate::arma_filters::concentrated_likelihood;
use crate::error::{Result, SsfError};
use crate::forecast::{exact_forecasts, ForecastResult};
use crate::likelihood::Likelihood;
use crate::model::ArimaModel;
use crate::polynomial::apply_filter;
use crate::types::ArmaFilterKind;

/// Likelihood of each differenced series under the stationary part of `model`.
#[instrument(skip_all, fields(n_series = series.len(), filter = kind.name()))]
pub fn batch_loglike(
    series: &[Vec<f64>],
    model: &ArimaModel,
    kind: ArmaFilterKind,
) -> Vec<Result<Likelihood>> {
    let arma = model.stationary();
    series
        .par_iter()
        .map(|y| {
            let w = apply_filter(&model.diff, y);
            if w.is_empty() {
                return Err(SsfError::DataError(format!(
                    "{} observations do not survive differencing of degree {}",
                    y.len(),
                    model.k_diff()
                )));
            }
            let mut filter = kind.create();
            concentrated_likelihood(filter.as_mut(), &arma, &w)
        })
        .collect()
}

/// Exact forecasts of each series, with `1 - alpha` intervals.
#[instrument(skip_all, fields(n_series = series.len(), steps = steps))]
pub fn batch_forecast(
    series: &[Vec<f64>],
    model: &ArimaModel,
    steps: usize,
    alpha: f64,
) -> Vec<Result<ForecastResult>> {
    series
        .par_iter()
        .map(|y| exact_forecasts(model, y, steps)?.with_intervals(alpha))
        .collect()
}
