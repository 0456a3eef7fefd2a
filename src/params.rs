use crate::error::{Result, SsfError};
use crate::types::SarimaOrder;

/// Unpacked SARIMA coefficients.
///
/// Flat layout: `[ar(p) | ma(q) | sar(P) | sma(Q)]`. The innovation
/// variance is never part of the vector: it is concentrated out.
#[derive(Debug, Clone, PartialEq)]
pub struct SarimaParams {
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sar: Vec<f64>,
    pub sma: Vec<f64>,
}

impl SarimaParams {
    pub fn from_flat(flat: &[f64], order: &SarimaOrder) -> Result<Self> {
        if flat.len() != order.n_coefficients() {
            return Err(SsfError::DimensionMismatch {
                what: "sarima parameters",
                expected: order.n_coefficients(),
                got: flat.len(),
            });
        }
        let (ar, rest) = flat.split_at(order.p);
        let (ma, rest) = rest.split_at(order.q);
        let (sar, sma) = rest.split_at(order.pp);
        Ok(Self {
            ar: ar.to_vec(),
            ma: ma.to_vec(),
            sar: sar.to_vec(),
            sma: sma.to_vec(),
        })
    }

    pub fn to_flat(&self) -> Vec<f64> {
        [&self.ar, &self.ma, &self.sar, &self.sma]
            .into_iter()
            .flatten()
            .copied()
            .collect()
    }

    /// Map unconstrained optimizer coordinates to stationary AR / invertible MA blocks.
    pub fn constrained(unconstrained: &[f64], order: &SarimaOrder) -> Result<Self> {
        let raw = Self::from_flat(unconstrained, order)?;
        Ok(Self {
            ar: constrain_stationary(&raw.ar),
            ma: constrain_invertible(&raw.ma),
            sar: constrain_stationary(&raw.sar),
            sma: constrain_invertible(&raw.sma),
        })
    }

    /// Inverse of [`SarimaParams::constrained`].
    pub fn unconstrained(&self) -> Vec<f64> {
        Self {
            ar: unconstrain_stationary(&self.ar),
            ma: unconstrain_invertible(&self.ma),
            sar: unconstrain_stationary(&self.sar),
            sma: unconstrain_invertible(&self.sma),
        }
        .to_flat()
    }
}

/// Durbin-Levinson step-up: partial autocorrelations to the coefficients
/// `phi` of `1 - phi_1 L - ... - phi_n L^n`.
fn step_up(pacf: &[f64]) -> Vec<f64> {
    let mut phi: Vec<f64> = Vec::with_capacity(pacf.len());
    for (k, &s) in pacf.iter().enumerate() {
        let next: Vec<f64> = (0..k).map(|i| phi[i] - s * phi[k - 1 - i]).collect();
        phi = next;
        phi.push(s);
    }
    phi
}

/// Inverse of [`step_up`]. Partial autocorrelations of modulus one are
/// clamped so the recursion stays finite.
fn step_down(coefficients: &[f64]) -> Vec<f64> {
    let mut phi = coefficients.to_vec();
    let mut pacf = vec![0.0; phi.len()];
    for k in (0..phi.len()).rev() {
        let s = phi[k];
        pacf[k] = s;
        let scale = (1.0 - s * s).max(1e-15);
        phi = (0..k).map(|i| (phi[i] + s * phi[k - 1 - i]) / scale).collect();
    }
    pacf
}

/// Monahan (1984): any real vector to the coefficients `phi` of a
/// stationary AR polynomial `1 - phi_1 L - ...`, through partial
/// autocorrelations `-x / sqrt(1 + x^2)`.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let pacf: Vec<f64> = unconstrained.iter().map(|x| -x / x.mul_add(*x, 1.0).sqrt()).collect();
    step_up(&pacf)
}

pub fn unconstrain_stationary(constrained: &[f64]) -> Vec<f64> {
    step_down(constrained)
        .into_iter()
        .map(|s| -s / (1.0 - s * s).max(1e-15).sqrt())
        .collect()
}

/// Coefficients `theta` of an invertible MA polynomial `1 + theta_1 L + ...`.
pub fn constrain_invertible(unconstrained: &[f64]) -> Vec<f64> {
    let mut theta = constrain_stationary(unconstrained);
    theta.iter_mut().for_each(|t| *t = -*t);
    theta
}

pub fn unconstrain_invertible(constrained: &[f64]) -> Vec<f64> {
    let phi: Vec<f64> = constrained.iter().map(|t| -t).collect();
    unconstrain_stationary(&phi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::{is_stationary, make_ar_poly};

    #[test]
    fn test_from_flat_to_flat_roundtrip() {
        let order = SarimaOrder::new(2, 0, 1, 1, 0, 1, 12);
        let flat = vec![0.5, -0.3, 0.2, 0.4, -0.1];
        let params = SarimaParams::from_flat(&flat, &order).unwrap();
        assert_eq!(params.ar, vec![0.5, -0.3]);
        assert_eq!(params.ma, vec![0.2]);
        assert_eq!(params.sar, vec![0.4]);
        assert_eq!(params.sma, vec![-0.1]);
        assert_eq!(params.to_flat(), flat);
    }

    #[test]
    fn test_from_flat_length_mismatch() {
        let order = SarimaOrder::new(1, 0, 0, 0, 0, 0, 0);
        assert!(SarimaParams::from_flat(&[0.5, 0.3], &order).is_err());
    }

    #[test]
    fn test_monahan_roundtrip_ar3() {
        let original = vec![1.0, -0.5, 0.2];
        let constrained = constrain_stationary(&original);
        let unconstrained = unconstrain_stationary(&constrained);
        for (a, b) in original.iter().zip(unconstrained.iter()) {
            assert!((a - b).abs() < 1e-10, "roundtrip failed: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_constrained_is_stationary() {
        // Any real vector maps into the stationarity region.
        let constrained = constrain_stationary(&[3.0, -2.5, 1.7]);
        assert!(is_stationary(&make_ar_poly(&constrained, 3)));
    }

    #[test]
    fn test_constrained_params_roundtrip() {
        let order = SarimaOrder::airline(12);
        let params = SarimaParams::constrained(&[0.3, -1.1], &order).unwrap();
        assert!(params.ma[0].abs() < 1.0);
        assert!(params.sma[0].abs() < 1.0);
        let back = params.unconstrained();
        assert!((back[0] - 0.3).abs() < 1e-10);
        assert!((back[1] + 1.1).abs() < 1e-10);
    }
}
