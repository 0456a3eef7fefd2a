//! Symmetric band matrices and their banded Cholesky factor.
//!
//! Only the lower band is stored: element `(i, j)` with `0 <= i - j <= bw`
//! lives at `data[(i - j, j)]`.

use nalgebra::DMatrix;

use crate::error::{Result, SsfError};

#[derive(Debug, Clone)]
pub struct SymmetricBandMatrix {
    data: DMatrix<f64>,
    bandwidth: usize,
}

impl SymmetricBandMatrix {
    pub fn zeros(dim: usize, bandwidth: usize) -> Self {
        Self {
            data: DMatrix::zeros(bandwidth + 1, dim),
            bandwidth,
        }
    }

    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }

    /// Element (i, j); zero outside the band.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        if i - j > self.bandwidth {
            0.0
        } else {
            self.data[(i - j, j)]
        }
    }

    /// Sets (i, j) and, implicitly, (j, i).
    pub fn set(&mut self, i: usize, j: usize, value: f64) -> Result<()> {
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        if i - j > self.bandwidth {
            return Err(SsfError::DimensionMismatch {
                what: "band offset",
                expected: self.bandwidth,
                got: i - j,
            });
        }
        self.data[(i - j, j)] = value;
        Ok(())
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_fn(n, n, |i, j| self.get(i, j))
    }

    /// Banded Cholesky factor, same zero-pivot rule as the dense `lcholesky`.
    pub fn cholesky(mut self, tol: f64) -> BandCholesky {
        let n = self.dim();
        let m = self.bandwidth;
        let scale = (0..n).map(|j| self.data[(0, j)]).fold(1.0_f64, f64::max);
        let eps = tol * scale;
        let mut rank = 0;
        for j in 0..n {
            let k0 = j.saturating_sub(m);
            let mut d = self.data[(0, j)];
            for k in k0..j {
                let l = self.data[(j - k, k)];
                d -= l * l;
            }
            let imax = (j + m).min(n.saturating_sub(1));
            if d <= eps {
                for i in j..=imax {
                    self.data[(i - j, j)] = 0.0;
                }
                continue;
            }
            rank += 1;
            let ljj = d.sqrt();
            self.data[(0, j)] = ljj;
            for i in (j + 1)..=imax {
                let mut v = self.data[(i - j, j)];
                for k in i.saturating_sub(m)..j {
                    v -= self.data[(i - k, k)] * self.data[(j - k, k)];
                }
                self.data[(i - j, j)] = v / ljj;
            }
        }
        BandCholesky {
            data: self.data,
            bandwidth: m,
            rank,
        }
    }
}

/// Lower band factor L with A = LL'.
#[derive(Debug, Clone)]
pub struct BandCholesky {
    data: DMatrix<f64>,
    bandwidth: usize,
    rank: usize,
}

impl BandCholesky {
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn diagonal(&self, i: usize) -> f64 {
        self.data[(0, i)]
    }

    /// b <- L^{-1} b, zero pivots give zero components.
    pub fn lsolve(&self, b: &mut [f64]) {
        let m = self.bandwidth;
        for i in 0..self.dim().min(b.len()) {
            let d = self.data[(0, i)];
            if d == 0.0 {
                b[i] = 0.0;
                continue;
            }
            let mut v = b[i];
            for k in i.saturating_sub(m)..i {
                v -= self.data[(i - k, k)] * b[k];
            }
            b[i] = v / d;
        }
    }

    /// log |A| = 2 sum log L_ii over the non-zero pivots.
    pub fn log_determinant(&self) -> f64 {
        (0..self.dim())
            .map(|i| self.data[(0, i)])
            .filter(|&d| d > 0.0)
            .map(|d| 2.0 * d.ln())
            .sum()
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.dim();
        let m = self.bandwidth;
        DMatrix::from_fn(n, n, |i, j| {
            if i >= j && i - j <= m {
                self.data[(i - j, j)]
            } else {
                0.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::distance;
    use crate::matrix::symmetric::{lcholesky, CHOLESKY_EPSILON};

    /// Covariance of an MA(2) process: a pentadiagonal Toeplitz matrix.
    fn ma2_band(n: usize) -> SymmetricBandMatrix {
        let (t1, t2) = (0.4, -0.3);
        let g = [1.0 + t1 * t1 + t2 * t2, t1 + t1 * t2, t2];
        let mut a = SymmetricBandMatrix::zeros(n, 2);
        for j in 0..n {
            for k in 0..=2 {
                if j + k < n {
                    a.set(j + k, j, g[k]).unwrap();
                }
            }
        }
        a
    }

    #[test]
    fn test_band_cholesky_matches_dense() {
        let a = ma2_band(12);
        let dense = a.to_dense();
        let l = a.cholesky(CHOLESKY_EPSILON);
        assert_eq!(l.rank(), 12);
        let mut reference = dense.clone();
        lcholesky(&mut reference, CHOLESKY_EPSILON);
        assert!(distance(&l.to_dense(), &reference) < 1e-12);
        assert!(distance(&(l.to_dense() * l.to_dense().transpose()), &dense) < 1e-12);

        let expected = dense.determinant().ln();
        assert!((l.log_determinant() - expected).abs() < 1e-10);
    }

    #[test]
    fn test_band_lsolve() {
        let a = ma2_band(8);
        let l = a.cholesky(CHOLESKY_EPSILON);
        let b: Vec<f64> = (0..8).map(|i| (i as f64).sin()).collect();
        let mut x = b.clone();
        l.lsolve(&mut x);
        let lx = l.to_dense() * nalgebra::DVector::from_vec(x);
        for i in 0..8 {
            assert!((lx[i] - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_set_outside_band_fails() {
        let mut a = SymmetricBandMatrix::zeros(5, 1);
        assert!(a.set(3, 0, 1.0).is_err());
        a.set(0, 1, 2.0).unwrap();
        assert_eq!(a.get(1, 0), 2.0);
        assert_eq!(a.get(4, 0), 0.0);
    }
}
