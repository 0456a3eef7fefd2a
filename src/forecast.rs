//! Forecasts and backcasts of ARIMA models.
//!
//! The exact routines run the diffuse Kalman filter on the full ARIMA state
//! and extrapolate the final prediction. The fast routines difference the
//! series, run the CKMS recursion on the stationary part only and integrate
//! the projected differences back. Both give the same means; the fast
//! variances are the asymptotic ones, `var * sum_{j<h} psi_j^2`.
//!
//! Backcasts are forecasts of the reversed series under the reversed model,
//! returned in chronological order: `mean[0]` is `y_{-nb}`, the last entry
//! is `y_{-1}`.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::instrument;

use crate::error::{Result, SsfError};
use crate::filter::{CkmsFilter, CkmsState, DiffuseFilter, DiffuseStatus};
use crate::model::ArimaModel;
use crate::polynomial::{apply_filter, psi_weights};
use crate::ssf::arima;
use crate::ssf::arma::ArmaSsf;
use crate::ssf::Ssf;

/// h-step ahead forecast result.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    /// Forecast means.
    pub mean: Vec<f64>,
    /// Forecast error variances, at the model's innovation variance.
    pub variance: Vec<f64>,
    /// Lower interval bounds; empty until [`ForecastResult::with_intervals`].
    pub ci_lower: Vec<f64>,
    /// Upper interval bounds.
    pub ci_upper: Vec<f64>,
}

impl ForecastResult {
    pub fn new(mean: Vec<f64>, variance: Vec<f64>) -> Self {
        Self {
            mean,
            variance,
            ci_lower: Vec::new(),
            ci_upper: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Adds the `1 - alpha` normal intervals `mean -/+ z_{1-alpha/2} sqrt(variance)`.
    pub fn with_intervals(mut self, alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SsfError::DataError(format!(
                "interval level alpha must lie in (0, 1), got {alpha}"
            )));
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| SsfError::ModelError(e.to_string()))?;
        let z = normal.inverse_cdf(1.0 - alpha / 2.0);
        let half: Vec<f64> = self.variance.iter().map(|v| z * v.max(0.0).sqrt()).collect();
        self.ci_lower = self.mean.iter().zip(&half).map(|(m, w)| m - w).collect();
        self.ci_upper = self.mean.iter().zip(&half).map(|(m, w)| m + w).collect();
        Ok(self)
    }

    fn reversed(mut self) -> Self {
        self.mean.reverse();
        self.variance.reverse();
        self.ci_lower.reverse();
        self.ci_upper.reverse();
        self
    }
}

/// Projects `(a, P)`, the prediction at position `start`, `steps` positions
/// ahead with the model's own dynamics.
pub fn extrapolate(
    ssf: &Ssf,
    start: usize,
    mut a: DVector<f64>,
    mut p: DMatrix<f64>,
    steps: usize,
) -> ForecastResult {
    let loading = &ssf.measurement.loading;
    let dynamics = ssf.dynamics.as_ref();
    let mut mean = Vec::with_capacity(steps);
    let mut variance = Vec::with_capacity(steps);
    for h in 0..steps {
        let pos = start + h;
        mean.push(loading.zx(pos, &a));
        variance.push((loading.zvz(pos, &p) + ssf.measurement.error_variance).max(0.0));
        dynamics.tx(pos, &mut a);
        dynamics.tvt(pos, &mut p);
        dynamics.add_v(pos, &mut p);
    }
    ForecastResult::new(mean, variance)
}

/// Forecasts of any state-space model, diffuse or not, through the diffuse
/// filter. Missing values in `y` are allowed.
#[instrument(skip_all, fields(n = y.len(), nf = nf))]
pub fn ssf_forecasts(ssf: &Ssf, y: &[f64], nf: usize) -> Result<ForecastResult> {
    let filtered = DiffuseFilter::default().process(ssf, y)?;
    if let DiffuseStatus::NotIdentified { missing } = filtered.status() {
        return Err(SsfError::DataError(format!(
            "{missing} diffuse directions left after {} observations; forecasts are undefined",
            y.len()
        )));
    }
    let results = filtered.results;
    Ok(extrapolate(
        ssf,
        y.len(),
        results.final_state,
        results.final_covariance,
        nf,
    ))
}

pub fn exact_forecasts(model: &ArimaModel, y: &[f64], nf: usize) -> Result<ForecastResult> {
    let ssf = arima::ssf(model)?;
    ssf_forecasts(&ssf, y, nf)
}

pub fn exact_backcasts(model: &ArimaModel, y: &[f64], nb: usize) -> Result<ForecastResult> {
    let reversed: Vec<f64> = y.iter().rev().copied().collect();
    exact_forecasts(&model.reversed(), &reversed, nb).map(ForecastResult::reversed)
}

#[instrument(skip_all, fields(n = y.len(), nf = nf))]
pub fn fast_forecasts(model: &ArimaModel, y: &[f64], nf: usize) -> Result<ForecastResult> {
    if let Some(pos) = y.iter().position(|v| !v.is_finite()) {
        return Err(SsfError::DataError(format!(
            "fast forecasts need complete data (position {pos})"
        )));
    }
    let d = model.k_diff();
    if y.len() <= d {
        return Err(SsfError::DataError(format!(
            "{} observations do not survive differencing of degree {d}",
            y.len()
        )));
    }

    let w = apply_filter(&model.diff[..=d], y);
    let ssf = ArmaSsf::new(&model.stationary())?.into_ssf()?;
    let initial = CkmsState::stationary(&ssf)?;
    let filtered = CkmsFilter::default().process(&ssf, &w, initial)?;

    let loading = &ssf.measurement.loading;
    let mut a = filtered.final_state;
    let mut levels = y[y.len() - d..].to_vec();
    let mut mean = Vec::with_capacity(nf);
    for h in 0..nf {
        let pos = w.len() + h;
        let dw = loading.zx(pos, &a);
        ssf.dynamics.tx(pos, &mut a);
        // diff(L) y_t = w_t
        let k = levels.len();
        let level = dw
            - (1..=d)
                .map(|i| model.diff[i] * levels[k - i])
                .sum::<f64>();
        levels.push(level);
        mean.push(level);
    }

    let psi = psi_weights(&model.full_ar(), &model.ma, nf);
    let variance = psi
        .iter()
        .scan(0.0, |acc, w| {
            *acc += w * w;
            Some(model.var * *acc)
        })
        .collect();
    Ok(ForecastResult::new(mean, variance))
}

pub fn fast_backcasts(model: &ArimaModel, y: &[f64], nb: usize) -> Result<ForecastResult> {
    let reversed: Vec<f64> = y.iter().rev().copied().collect();
    fast_forecasts(&model.reversed(), &reversed, nb).map(ForecastResult::reversed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArmaModel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal as Gaussian};

    fn integrated_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Gaussian::new(0.0, 1.0).unwrap();
        let mut level = 10.0;
        (0..n)
            .map(|_| {
                level += normal.sample(&mut rng);
                level
            })
            .collect()
    }

    fn load_fixtures() -> serde_json::Value {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/airline.json");
        let data = std::fs::read_to_string(path).expect("fixtures file not found");
        serde_json::from_str(&data).expect("invalid JSON")
    }

    fn airline_log() -> Vec<f64> {
        load_fixtures()["airline"]["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap().ln())
            .collect()
    }

    #[test]
    fn test_airline_exact_matches_fast() {
        let y = airline_log();
        assert_eq!(y.len(), 144);
        let model = ArimaModel::airline(12, -0.6, -0.8).unwrap();
        let exact = exact_forecasts(&model, &y, 36).unwrap();
        let fast = fast_forecasts(&model, &y, 36).unwrap();
        for (h, (e, f)) in exact.mean.iter().zip(&fast.mean).enumerate() {
            assert!((e - f).abs() < 1e-8, "forecast {h}: {e} vs {f}");
        }
        // upward trend with a July peak
        assert!(exact.mean[6] > y[143]);
        assert!(exact.mean[18] > exact.mean[6]);
        for w in exact.variance.windows(2) {
            assert!(w[1] >= w[0] - 1e-12);
        }

        let exact = exact_backcasts(&model, &y, 36).unwrap();
        let fast = fast_backcasts(&model, &y, 36).unwrap();
        for (h, (e, f)) in exact.mean.iter().zip(&fast.mean).enumerate() {
            assert!((e - f).abs() < 1e-8, "backcast {h}: {e} vs {f}");
        }
        // the nearest backcast is the most certain
        assert!(exact.variance[35] < exact.variance[0]);
    }

    #[test]
    fn test_ar1_forecasts() {
        let phi: f64 = 0.65;
        let model: ArimaModel = ArmaModel::new(vec![1.0, -phi], vec![1.0], 1.0).unwrap().into();
        let y = [0.3, -0.2, 1.1, 0.8];
        let f = exact_forecasts(&model, &y, 3).unwrap();
        for h in 0..3 {
            let expected = phi.powi(h as i32 + 1) * 0.8;
            assert!((f.mean[h] - expected).abs() < 1e-12, "h={h}: {} vs {expected}", f.mean[h]);
        }
        assert!((f.variance[0] - 1.0).abs() < 1e-12);
        assert!((f.variance[1] - (1.0 + phi * phi)).abs() < 1e-12);
        assert!(f.ci_lower.is_empty());
    }

    #[test]
    fn test_random_walk_exact_and_fast_agree() {
        let model = ArimaModel::new(vec![1.0], vec![1.0, -1.0], vec![1.0], 2.0).unwrap();
        let y = [1.0, 3.0, 2.5];
        let exact = exact_forecasts(&model, &y, 4).unwrap();
        let fast = fast_forecasts(&model, &y, 4).unwrap();
        for h in 0..4 {
            assert!((exact.mean[h] - 2.5).abs() < 1e-12);
            assert!((fast.mean[h] - 2.5).abs() < 1e-12);
            let var = 2.0 * (h + 1) as f64;
            assert!((exact.variance[h] - var).abs() < 1e-10, "h={h}: {}", exact.variance[h]);
            assert!((fast.variance[h] - var).abs() < 1e-12);
        }
        let back = exact_backcasts(&model, &y, 2).unwrap();
        assert!(back.mean.iter().all(|m| (m - 1.0).abs() < 1e-12));
        assert!((back.variance[0] - 4.0).abs() < 1e-10);
        assert!((back.variance[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_seasonal_model_exact_matches_fast() {
        let model = ArimaModel::airline(4, -0.4, -0.6).unwrap();
        let y = integrated_noise(60, 21);
        let exact = exact_forecasts(&model, &y, 12).unwrap();
        let fast = fast_forecasts(&model, &y, 12).unwrap();
        for (h, (e, f)) in exact.mean.iter().zip(&fast.mean).enumerate() {
            assert!((e - f).abs() < 1e-8 * (1.0 + e.abs()), "forecast {h}: {e} vs {f}");
        }
        let exact = exact_backcasts(&model, &y, 12).unwrap();
        let fast = fast_backcasts(&model, &y, 12).unwrap();
        for (h, (e, f)) in exact.mean.iter().zip(&fast.mean).enumerate() {
            assert!((e - f).abs() < 1e-8 * (1.0 + e.abs()), "backcast {h}: {e} vs {f}");
        }
        // exact variances include the state uncertainty
        assert!(exact.variance[11] >= fast.variance[11] - 1e-10);
    }

    #[test]
    fn test_intervals() {
        let f = ForecastResult::new(vec![1.0, 2.0], vec![1.0, 4.0]).with_intervals(0.05).unwrap();
        assert!((f.ci_upper[0] - 1.0 - 1.959964).abs() < 1e-5);
        assert!((f.ci_lower[1] - (2.0 - 2.0 * 1.959964)).abs() < 1e-5);
        for alpha in [0.0, 1.0, -0.1, f64::NAN] {
            assert!(matches!(
                ForecastResult::new(vec![1.0], vec![1.0]).with_intervals(alpha),
                Err(SsfError::DataError(_))
            ));
        }
    }

    #[test]
    fn test_undefined_forecasts() {
        let model = ArimaModel::airline(12, -0.6, -0.8).unwrap();
        let y = integrated_noise(8, 1);
        assert!(matches!(exact_forecasts(&model, &y, 3), Err(SsfError::DataError(_))));
        assert!(matches!(fast_forecasts(&model, &y, 3), Err(SsfError::DataError(_))));

        let mut y = integrated_noise(40, 2);
        y[10] = f64::NAN;
        assert!(matches!(fast_forecasts(&model, &y, 3), Err(SsfError::DataError(_))));
        // the exact routine skips the missing value
        assert_eq!(exact_forecasts(&model, &y, 3).unwrap().len(), 3);
    }
}
