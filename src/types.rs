use std::str::FromStr;

use crate::error::{Result, SsfError};

/// SARIMA model order (p,d,q)(P,D,Q)s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SarimaOrder {
    pub p: usize,   // AR order
    pub d: usize,   // differencing order
    pub q: usize,   // MA order
    pub pp: usize,  // seasonal AR order (P)
    pub dd: usize,  // seasonal differencing order (D)
    pub qq: usize,  // seasonal MA order (Q)
    pub s: usize,   // seasonal period
}

impl SarimaOrder {
    pub fn new(p: usize, d: usize, q: usize, pp: usize, dd: usize, qq: usize, s: usize) -> Self {
        Self { p, d, q, pp, dd, qq, s }
    }

    /// Airline model (0,1,1)(0,1,1)s.
    pub fn airline(s: usize) -> Self {
        Self::new(0, 1, 1, 0, 1, 1, s)
    }

    /// Extended AR order: p + s*P
    pub fn k_ar(&self) -> usize {
        self.p + self.s * self.pp
    }

    /// Extended MA order: q + s*Q
    pub fn k_ma(&self) -> usize {
        self.q + self.s * self.qq
    }

    /// Differencing polynomial degree: d + s*D
    pub fn k_diff(&self) -> usize {
        self.d + self.s * self.dd
    }

    /// Stationary block dimension: max(k_ar, k_ma + 1)
    pub fn k_order(&self) -> usize {
        std::cmp::max(self.k_ar(), self.k_ma() + 1)
    }

    /// Total state dimension of the ARIMA representation.
    pub fn k_states(&self) -> usize {
        self.k_order() + self.k_diff()
    }

    /// Number of free coefficients (sigma2 excluded).
    pub fn n_coefficients(&self) -> usize {
        self.p + self.q + self.pp + self.qq
    }
}

/// Whether a filter run keeps the per-step predicted states needed by a smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    LikelihoodOnly,
    Full,
}

/// Numerical settings shared by the state-space filters.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Prediction-error variances at or below this carry no information.
    pub zero_variance: f64,
    /// Relative threshold under which the diffuse variance `Finf` is zero.
    pub diffuse_epsilon: f64,
    pub storage: Storage,
    /// CKMS switches to steady state once the rank-one correction drops below this.
    pub ckms_convergence: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            zero_variance: 1e-12,
            diffuse_epsilon: 1e-9,
            storage: Storage::LikelihoodOnly,
            ckms_convergence: 1e-13,
        }
    }
}

impl FilterConfig {
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }
}

/// Fast ARMA likelihood algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmaFilterKind {
    Ansley,
    Kalman,
    LjungBox,
    ModifiedLjungBox,
}

impl ArmaFilterKind {
    pub const ALL: [ArmaFilterKind; 4] = [
        ArmaFilterKind::Ansley,
        ArmaFilterKind::Kalman,
        ArmaFilterKind::LjungBox,
        ArmaFilterKind::ModifiedLjungBox,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArmaFilterKind::Ansley => "ansley",
            ArmaFilterKind::Kalman => "kalman",
            ArmaFilterKind::LjungBox => "ljungbox",
            ArmaFilterKind::ModifiedLjungBox => "modifiedljungbox",
        }
    }
}

impl FromStr for ArmaFilterKind {
    type Err = SsfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ansley" => Ok(ArmaFilterKind::Ansley),
            "kalman" => Ok(ArmaFilterKind::Kalman),
            "ljungbox" | "ljung_box" => Ok(ArmaFilterKind::LjungBox),
            "modifiedljungbox" | "modified_ljung_box" => Ok(ArmaFilterKind::ModifiedLjungBox),
            _ => Err(SsfError::ModelError(format!(
                "unknown ARMA filter '{s}' (expected ansley, kalman, ljungbox or modifiedljungbox)"
            ))),
        }
    }
}

impl Default for ArmaFilterKind {
    fn default() -> Self {
        ArmaFilterKind::Kalman
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sarima_111_111_12_k_states() {
        // k_ar = 1 + 12 = 13, k_ma = 13, k_order = max(13, 14) = 14
        // k_diff = 1 + 12 = 13, k_states = 27
        let order = SarimaOrder::new(1, 1, 1, 1, 1, 1, 12);
        assert_eq!(order.k_ar(), 13);
        assert_eq!(order.k_ma(), 13);
        assert_eq!(order.k_order(), 14);
        assert_eq!(order.k_diff(), 13);
        assert_eq!(order.k_states(), 27);
    }

    #[test]
    fn test_airline_k_states() {
        let order = SarimaOrder::airline(12);
        assert_eq!(order.k_ma(), 13);
        assert_eq!(order.k_order(), 14);
        assert_eq!(order.k_diff(), 13);
        assert_eq!(order.n_coefficients(), 2);
    }

    #[test]
    fn test_ar2_k_states() {
        let order = SarimaOrder::new(2, 0, 0, 0, 0, 0, 0);
        assert_eq!(order.k_order(), 2);
        assert_eq!(order.k_states(), 2);
    }

    #[test]
    fn test_filter_kind_from_str() {
        assert_eq!("ansley".parse::<ArmaFilterKind>().unwrap(), ArmaFilterKind::Ansley);
        assert_eq!("LjungBox".parse::<ArmaFilterKind>().unwrap(), ArmaFilterKind::LjungBox);
        assert_eq!(
            "modified_ljung_box".parse::<ArmaFilterKind>().unwrap(),
            ArmaFilterKind::ModifiedLjungBox
        );
        for kind in ArmaFilterKind::ALL {
            assert_eq!(kind.name().parse::<ArmaFilterKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_filter_kind_unknown_name() {
        for name in ["ansly", "unknown", ""] {
            assert!(matches!(name.parse::<ArmaFilterKind>(), Err(SsfError::ModelError(_))), "{name}");
        }
    }

    #[test]
    fn test_default_config() {
        let config = FilterConfig::default();
        assert_eq!(config.storage, Storage::LikelihoodOnly);
        assert!(config.zero_variance > 0.0);
        let full = FilterConfig::default().with_storage(Storage::Full);
        assert_eq!(full.storage, Storage::Full);
    }
}
