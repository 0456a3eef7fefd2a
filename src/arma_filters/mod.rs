//! Likelihood-only filters for stationary ARMA processes.
//!
//! Every filter maps `y` (no missing values) to a vector `e` with
//! `e'e = y' Cov(y)^{-1} y` and reports `ln |Cov(y)|`. They differ in how the
//! start-up of the process is handled and in the length of `e`.

pub mod ansley;
pub mod kalman;
pub mod ljung_box;
pub mod modified_ljung_box;

pub use ansley::AnsleyFilter;
pub use kalman::KalmanArmaFilter;
pub use ljung_box::LjungBoxFilter;
pub use modified_ljung_box::ModifiedLjungBoxFilter;

use crate::error::{Result, SsfError};
use crate::likelihood::Likelihood;
use crate::model::ArmaModel;
use crate::types::ArmaFilterKind;

pub trait ArmaFilter: Send {
    /// Precomputes everything that depends on the model and the number of
    /// observations only. Returns the length of the output of `apply`.
    fn prepare(&mut self, model: &ArmaModel, n: usize) -> Result<usize>;

    /// Writes the transformed residuals of `y` into `out`.
    fn apply(&self, y: &[f64], out: &mut [f64]) -> Result<()>;

    /// `ln |Cov(y)|` of the prepared model, variance included.
    fn log_determinant(&self) -> f64;
}

impl ArmaFilterKind {
    pub fn create(&self) -> Box<dyn ArmaFilter + Send> {
        match self {
            ArmaFilterKind::Ansley => Box::new(AnsleyFilter::default()),
            ArmaFilterKind::Kalman => Box::new(KalmanArmaFilter::default()),
            ArmaFilterKind::LjungBox => Box::new(LjungBoxFilter::default()),
            ArmaFilterKind::ModifiedLjungBox => Box::new(ModifiedLjungBoxFilter::default()),
        }
    }
}

/// Likelihood ingredients of `y` under `model` through `filter`.
pub fn concentrated_likelihood(
    filter: &mut dyn ArmaFilter,
    model: &ArmaModel,
    y: &[f64],
) -> Result<Likelihood> {
    let len = filter.prepare(model, y.len())?;
    let mut out = vec![0.0; len];
    filter.apply(y, &mut out)?;
    let ssq = out.iter().map(|e| e * e).sum();
    Ok(Likelihood::new(y.len(), filter.log_determinant(), ssq))
}

/// Shared argument checks of `apply`.
pub(crate) fn check_apply(prepared: Option<(usize, usize)>, y: &[f64], out: &[f64]) -> Result<()> {
    let (n, len) = prepared.ok_or_else(|| SsfError::ModelError("filter used before prepare".into()))?;
    if y.len() != n {
        return Err(SsfError::DimensionMismatch {
            what: "observations",
            expected: n,
            got: y.len(),
        });
    }
    if out.len() != len {
        return Err(SsfError::DimensionMismatch {
            what: "filter output",
            expected: len,
            got: out.len(),
        });
    }
    if let Some(pos) = y.iter().position(|v| !v.is_finite()) {
        return Err(SsfError::DataError(format!(
            "ARMA filters need complete data (position {pos})"
        )));
    }
    Ok(())
}

/// `ar(L) y` and `ma(L)` residual recursion used by the Ljung-Box filters:
///   e_t = sum_i ar_i y_{t-i} - sum_{j>=1} ma_j e_{t-j},
/// where `y_{s}` and `e_{s}` for `s < start` come from `pre_y` / `pre_e`
/// (`pre_y[a - 1] = y_{start - a}`, `pre_e[b - 1] = e_{start - b}`).
pub(crate) fn residuals(
    ar: &[f64],
    ma: &[f64],
    y: &[f64],
    start: usize,
    pre_y: &[f64],
    pre_e: &[f64],
) -> Vec<f64> {
    let n = y.len();
    let mut e = vec![0.0; n - start.min(n)];
    for t in start..n {
        let mut v = 0.0;
        for (i, &c) in ar.iter().enumerate() {
            v += c * if t >= start + i {
                y[t - i]
            } else {
                pre_y.get(start + i - t - 1).copied().unwrap_or(0.0)
            };
        }
        for (j, &c) in ma.iter().enumerate().skip(1) {
            v -= c * if t >= start + j {
                e[t - j - start]
            } else {
                pre_e.get(start + j - t - 1).copied().unwrap_or(0.0)
            };
        }
        e[t - start] = v;
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::OrdinaryFilter;
    use crate::model::ArimaModel;
    use crate::ssf::arma::ArmaSsf;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn simulate(model: &ArmaModel, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, model.var.sqrt()).unwrap();
        let burn = 200;
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

    fn models() -> Vec<ArmaModel> {
        vec![
            ArmaModel::new(vec![1.0, -0.5, 0.2], vec![1.0, 0.4], 1.5).unwrap(),
            ArmaModel::new(vec![1.0, -0.3, 0.1, -0.2], vec![1.0], 0.7).unwrap(),
            ArmaModel::new(vec![1.0], vec![1.0, 0.5, -0.3], 2.0).unwrap(),
            ArmaModel::new(vec![1.0, 0.6], vec![1.0, -0.2, 0.3, 0.4], 1.0).unwrap(),
            ArimaModel::airline(12, -0.6, -0.8).unwrap().stationary(),
            // gamma(1) = 0
            ArmaModel::new(vec![1.0], vec![1.0, 0.0, 0.0, 0.0, -0.8], 1.0).unwrap(),
            ArimaModel::airline(12, 0.0, -0.8).unwrap().stationary(),
            ArmaModel::white_noise(),
        ]
    }

    #[test]
    fn test_filters_agree_with_kalman_filter() {
        for (m, model) in models().iter().enumerate() {
            let y = simulate(model, 90, 100 + m as u64);
            let ssf = ArmaSsf::new(model).unwrap().into_ssf().unwrap();
            let reference = OrdinaryFilter::default().process(&ssf, &y).unwrap().likelihood;
            for kind in ArmaFilterKind::ALL {
                let mut filter = kind.create();
                let ll = concentrated_likelihood(filter.as_mut(), model, &y).unwrap();
                let tol = 1e-6 * (1.0 + reference.logdet.abs());
                assert!(
                    (ll.logdet - reference.logdet).abs() < tol,
                    "model {m}, {}: logdet {} vs {}",
                    kind.name(),
                    ll.logdet,
                    reference.logdet
                );
                let tol = 1e-6 * (1.0 + reference.ssq.abs());
                assert!(
                    (ll.ssq - reference.ssq).abs() < tol,
                    "model {m}, {}: ssq {} vs {}",
                    kind.name(),
                    ll.ssq,
                    reference.ssq
                );
                assert_eq!(ll.n, 90);
            }
        }
    }

    #[test]
    fn test_short_series() {
        let model = ArmaModel::new(vec![1.0, -0.4, 0.3, -0.1], vec![1.0, 0.2], 1.0).unwrap();
        let y = [0.5, -1.0];
        let ssf = ArmaSsf::new(&model).unwrap().into_ssf().unwrap();
        let reference = OrdinaryFilter::default().process(&ssf, &y).unwrap().likelihood;
        for kind in ArmaFilterKind::ALL {
            let mut filter = kind.create();
            let ll = concentrated_likelihood(filter.as_mut(), &model, &y).unwrap();
            assert!((ll.logdet - reference.logdet).abs() < 1e-9, "{}", kind.name());
            assert!((ll.ssq - reference.ssq).abs() < 1e-9, "{}", kind.name());
        }
    }

    #[test]
    fn test_output_lengths() {
        let model = ArmaModel::new(vec![1.0, -0.5, 0.2], vec![1.0, 0.4], 1.0).unwrap();
        let expected = [
            (ArmaFilterKind::Ansley, 50),
            (ArmaFilterKind::Kalman, 50),
            (ArmaFilterKind::LjungBox, 53),
            (ArmaFilterKind::ModifiedLjungBox, 51),
        ];
        for (kind, len) in expected {
            assert_eq!(kind.create().prepare(&model, 50).unwrap(), len, "{}", kind.name());
        }
    }

    #[test]
    fn test_apply_checks_arguments() {
        let model = ArmaModel::new(vec![1.0, -0.5], vec![1.0, 0.4], 1.0).unwrap();
        for kind in ArmaFilterKind::ALL {
            let mut filter = kind.create();
            assert!(matches!(
                filter.apply(&[1.0, 2.0], &mut [0.0; 2]),
                Err(SsfError::ModelError(_))
            ));
            let len = filter.prepare(&model, 3).unwrap();
            let mut out = vec![0.0; len];
            assert!(matches!(
                filter.apply(&[1.0, 2.0], &mut out),
                Err(SsfError::DimensionMismatch { .. })
            ));
            assert!(matches!(
                filter.apply(&[1.0, f64::NAN, 2.0], &mut out),
                Err(SsfError::DataError(_))
            ));
        }
    }

    #[test]
    fn test_non_stationary_model_rejected() {
        let model = ArmaModel::new(vec![1.0, -1.0], vec![1.0], 1.0).unwrap();
        for kind in ArmaFilterKind::ALL {
            assert!(
                matches!(kind.create().prepare(&model, 10), Err(SsfError::NonStationary)),
                "{}",
                kind.name()
            );
        }
    }

    #[test]
    fn test_residual_recursion_with_pre_sample() {
        // (1 - 0.5L) y_t = (1 + 0.4L) e_t, y_{-1} = 2, e_{-1} = 1
        let e = residuals(&[1.0, -0.5], &[1.0, 0.4], &[1.0, 3.0], 0, &[2.0], &[1.0]);
        let e0 = 1.0 - 0.5 * 2.0 - 0.4 * 1.0;
        let e1 = 3.0 - 0.5 * 1.0 - 0.4 * e0;
        assert!((e[0] - e0).abs() < 1e-15);
        assert!((e[1] - e1).abs() < 1e-15);
    }
}
