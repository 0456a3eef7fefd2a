use crate::error::{Result, SsfError};

/// Running product of variances kept as `mantissa * 2^exponent`, so long
/// series neither overflow nor underflow before the final logarithm.
///
/// `add` followed by `remove` of the same value restores the log-determinant
/// up to rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct DeterminantalTerm {
    mantissa: f64,
    exponent: i64,
    count: usize,
}

impl Default for DeterminantalTerm {
    fn default() -> Self {
        Self {
            mantissa: 1.0,
            exponent: 0,
            count: 0,
        }
    }
}

/// Splits a positive finite `x` into `m * 2^e` with `m` in [0.5, 1).
fn frexp(x: f64) -> (f64, i64) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i64;
    if raw_exp == 0 {
        // subnormal: rescale into the normal range first
        let (m, e) = frexp(x * f64::from_bits(0x4350_0000_0000_0000)); // 2^54
        return (m, e - 54);
    }
    let e = raw_exp - 1022;
    let m = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (m, e)
}

impl DeterminantalTerm {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(var: f64) -> Result<()> {
        if !(var > 0.0) || !var.is_finite() {
            return Err(SsfError::InvalidVariance(var));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        let (m, e) = frexp(self.mantissa);
        self.mantissa = m;
        self.exponent += e;
    }

    pub fn add(&mut self, var: f64) -> Result<()> {
        Self::check(var)?;
        self.mantissa *= var;
        self.normalize();
        self.count += 1;
        Ok(())
    }

    pub fn remove(&mut self, var: f64) -> Result<()> {
        Self::check(var)?;
        self.mantissa /= var;
        self.normalize();
        self.count = self.count.saturating_sub(1);
        Ok(())
    }

    pub fn log_determinant(&self) -> f64 {
        self.mantissa.ln() + self.exponent as f64 * std::f64::consts::LN_2
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
