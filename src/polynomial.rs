use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SsfError};

/// Polynomial multiplication (convolution): c[k] = sum_i a[i]*b[k-i].
pub fn polymul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return vec![];
    }
    let mut r = vec![0.0; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            r[i + j] += ai * bj;
        }
    }
    r
}

/// AR polynomial: 1 - phi_1*L - phi_2*L^2 - ...
/// `coeffs` = [phi_1, phi_2, ...], `max_lag` = p.
pub fn make_ar_poly(coeffs: &[f64], max_lag: usize) -> Vec<f64> {
    let mut p = vec![0.0; max_lag + 1];
    p[0] = 1.0;
    for (i, &c) in coeffs.iter().enumerate() {
        if i < max_lag {
            p[i + 1] = -c;
        }
    }
    p
}

/// Seasonal AR polynomial: 1 - Phi_1*L^s - Phi_2*L^(2s) - ...
pub fn make_seasonal_ar_poly(coeffs: &[f64], s: usize) -> Vec<f64> {
    if coeffs.is_empty() {
        return vec![1.0];
    }
    let mut p = vec![0.0; coeffs.len() * s + 1];
    p[0] = 1.0;
    for (i, &c) in coeffs.iter().enumerate() {
        p[(i + 1) * s] = -c;
    }
    p
}

/// MA polynomial: 1 + theta_1*L + theta_2*L^2 + ...
/// `coeffs` = [theta_1, theta_2, ...], `max_lag` = q.
pub fn make_ma_poly(coeffs: &[f64], max_lag: usize) -> Vec<f64> {
    let mut p = vec![0.0; max_lag + 1];
    p[0] = 1.0;
    for (i, &c) in coeffs.iter().enumerate() {
        if i < max_lag {
            p[i + 1] = c;
        }
    }
    p
}

/// Seasonal MA polynomial: 1 + Theta_1*L^s + Theta_2*L^(2s) + ...
pub fn make_seasonal_ma_poly(coeffs: &[f64], s: usize) -> Vec<f64> {
    if coeffs.is_empty() {
        return vec![1.0];
    }
    let mut p = vec![0.0; coeffs.len() * s + 1];
    p[0] = 1.0;
    for (i, &c) in coeffs.iter().enumerate() {
        p[(i + 1) * s] = c;
    }
    p
}

/// Differencing polynomial (1 - L)^d (1 - L^s)^D.
pub fn differencing_poly(d: usize, dd: usize, s: usize) -> Vec<f64> {
    let mut p = vec![1.0];
    for _ in 0..d {
        p = polymul(&p, &[1.0, -1.0]);
    }
    if s > 0 {
        let mut seasonal = vec![0.0; s + 1];
        seasonal[0] = 1.0;
        seasonal[s] = -1.0;
        for _ in 0..dd {
            p = polymul(&p, &seasonal);
        }
    }
    p
}

/// Degree of a coefficient vector (trailing zeros ignored).
pub fn degree(p: &[f64]) -> usize {
    p.iter().rposition(|&c| c != 0.0).unwrap_or(0)
}

/// First `n` coefficients of ma(L) / ar(L).
pub fn psi_weights(ar: &[f64], ma: &[f64], n: usize) -> Vec<f64> {
    let mut psi = vec![0.0; n];
    let a0 = ar.first().copied().unwrap_or(1.0);
    for k in 0..n {
        let mut v = ma.get(k).copied().unwrap_or(0.0);
        for i in 1..ar.len().min(k + 1) {
            v -= ar[i] * psi[k - i];
        }
        psi[k] = v / a0;
    }
    psi
}

/// Stationarity test by step-down (reverse Levinson) recursion: every
/// partial autocorrelation must lie strictly inside (-1, 1).
pub fn is_stationary(ar: &[f64]) -> bool {
    let p = degree(ar);
    if p == 0 {
        return true;
    }
    let a0 = ar[0];
    if a0 == 0.0 {
        return false;
    }
    let mut a: Vec<f64> = ar[..=p].iter().map(|&c| c / a0).collect();
    for k in (1..=p).rev() {
        let r = a[k];
        if !(r.abs() < 1.0) {
            return false;
        }
        let denom = 1.0 - r * r;
        let prev = a.clone();
        for i in 1..k {
            a[i] = (prev[i] - r * prev[k - i]) / denom;
        }
        a[k] = 0.0;
    }
    true
}

/// Autocovariances gamma(0..n) of the stationary ARMA `ar(L) x_t = ma(L) e_t`,
/// `Var(e_t) = var`.
///
/// gamma(0..=p) solve the (p+1)-dimensional system
///   sum_i ar_i gamma(|k-i|) = var * sum_{j>=k} ma_j psi_{j-k},
/// the remaining lags follow from the AR recursion.
pub fn autocovariances(ar: &[f64], ma: &[f64], var: f64, n: usize) -> Result<Vec<f64>> {
    if !is_stationary(ar) {
        return Err(SsfError::NonStationary);
    }
    let a0 = ar[0];
    let ar: Vec<f64> = ar[..=degree(ar)].iter().map(|&c| c / a0).collect();
    let ma: Vec<f64> = ma.iter().map(|&c| c / a0).collect();
    let p = ar.len() - 1;
    let q = ma.len().saturating_sub(1);
    let psi = psi_weights(&ar, &ma, q + 1);

    let rhs = |k: usize| -> f64 {
        let mut c = 0.0;
        for j in k..=q {
            c += ma[j] * psi[j - k];
        }
        c * var
    };

    let nlags = n.max(p + 1);
    let mut gamma = vec![0.0; nlags];

    let mut a = DMatrix::<f64>::zeros(p + 1, p + 1);
    let mut b = DVector::<f64>::zeros(p + 1);
    for k in 0..=p {
        for (i, &ai) in ar.iter().enumerate() {
            let lag = if k >= i { k - i } else { i - k };
            a[(k, lag)] += ai;
        }
        b[k] = rhs(k);
    }
    let solution = a.lu().solve(&b).ok_or(SsfError::NonStationary)?;
    for k in 0..=p {
        gamma[k] = solution[k];
    }
    for k in (p + 1)..nlags {
        let mut g = if k <= q { rhs(k) } else { 0.0 };
        for i in 1..=p {
            g -= ar[i] * gamma[k - i];
        }
        gamma[k] = g;
    }
    if !(gamma[0] > 0.0) || !gamma[0].is_finite() {
        return Err(SsfError::NonStationary);
    }
    gamma.truncate(n);
    Ok(gamma)
}

/// Applies `poly(L)` to `y`: out[t - deg] = sum_i poly[i] y[t - i], t >= deg.
pub fn apply_filter(poly: &[f64], y: &[f64]) -> Vec<f64> {
    let deg = poly.len().saturating_sub(1);
    if y.len() <= deg {
        return vec![];
    }
    (deg..y.len())
        .map(|t| {
            poly.iter()
                .enumerate()
                .map(|(i, &c)| c * y[t - i])
                .sum()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
