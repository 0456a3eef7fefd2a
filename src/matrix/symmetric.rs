//! Symmetric-matrix products and the tolerant Cholesky factorization.
//!
//! Products are evaluated on the lower triangle only and mirrored, so the
//! results are symmetric bit for bit.

use nalgebra::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};

/// Default tolerance of [`lcholesky`].
pub const CHOLESKY_EPSILON: f64 = 1e-9;

/// X'X.
pub fn xtx<R: Dim, C: Dim, S: Storage<f64, R, C>>(x: &Matrix<f64, R, C, S>) -> DMatrix<f64> {
    let n = x.ncols();
    let mut r = DMatrix::zeros(n, n);
    for j in 0..n {
        let cj = x.column(j);
        for i in j..n {
            let s = x.column(i).dot(&cj);
            r[(i, j)] = s;
            r[(j, i)] = s;
        }
    }
    r
}

/// XX'.
pub fn xxt<R: Dim, C: Dim, S: Storage<f64, R, C>>(x: &Matrix<f64, R, C, S>) -> DMatrix<f64> {
    let n = x.nrows();
    let mut r = DMatrix::zeros(n, n);
    for j in 0..n {
        let rj = x.row(j);
        for i in j..n {
            let s = x.row(i).dot(&rj);
            r[(i, j)] = s;
            r[(j, i)] = s;
        }
    }
    r
}

/// x'Sx.
pub fn quadratic_form(s: &DMatrix<f64>, x: &DVector<f64>) -> f64 {
    let n = x.len();
    let mut q = 0.0;
    for j in 0..n {
        let xj = x[j];
        if xj == 0.0 {
            continue;
        }
        let mut c = s[(j, j)] * xj;
        for i in (j + 1)..n {
            c += 2.0 * s[(i, j)] * x[i];
        }
        q += c * xj;
    }
    q
}

/// X'SX, symmetric by construction.
pub fn quadratic_form_matrix(s: &DMatrix<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    let sx = s * x;
    let n = x.ncols();
    let mut r = DMatrix::zeros(n, n);
    for j in 0..n {
        for i in j..n {
            let v = x.column(i).dot(&sx.column(j));
            r[(i, j)] = v;
            r[(j, i)] = v;
        }
    }
    r
}

/// Copies the lower triangle onto the upper one.
pub fn reenforce_symmetry(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            m[(j, i)] = m[(i, j)];
        }
    }
}

/// Replaces `m` by (m + m')/2.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for j in 0..n {
        for i in (j + 1)..n {
            let v = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = v;
            m[(j, i)] = v;
        }
    }
}

pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    m.is_square() && (0..m.nrows()).all(|j| (j + 1..m.nrows()).all(|i| m[(i, j)] == m[(j, i)]))
}

/// In-place lower Cholesky factor of the symmetric matrix `s` (lower
/// triangle read, upper triangle zeroed on exit). Returns the rank.
///
/// A pivot whose updated value is `<= tol * max(1, max diag(s))` is a
/// structurally zero direction: its whole column of the factor is set to
/// zero and the factorization continues.
pub fn lcholesky(s: &mut DMatrix<f64>, tol: f64) -> usize {
    let n = s.nrows();
    let scale = (0..n).map(|i| s[(i, i)]).fold(1.0_f64, f64::max);
    let eps = tol * scale;
    let mut rank = 0;
    for j in 0..n {
        let mut d = s[(j, j)];
        for k in 0..j {
            let l = s[(j, k)];
            d -= l * l;
        }
        if d <= eps {
            for i in j..n {
                s[(i, j)] = 0.0;
            }
            continue;
        }
        rank += 1;
        let ljj = d.sqrt();
        s[(j, j)] = ljj;
        for i in (j + 1)..n {
            let mut v = s[(i, j)];
            for k in 0..j {
                v -= s[(i, k)] * s[(j, k)];
            }
            s[(i, j)] = v / ljj;
        }
    }
    for j in 1..n {
        for i in 0..j {
            s[(i, j)] = 0.0;
        }
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::testing::random_matrix;
    use crate::matrix::triangular::{lsolve, rsolve};
    use crate::matrix::{distance, transpose_view};
    use approx::assert_relative_eq;

    #[test]
    fn test_xtx_exact_symmetry() {
        for seed in 0..5 {
            let x = random_matrix(13, 6, seed);
            let r = xtx(&x);
            assert!(is_symmetric(&r));
            assert!(distance(&r, &(x.transpose() * &x)) < 1e-9);
            let q = xxt(&x);
            assert!(is_symmetric(&q));
            assert!(distance(&q, &(&x * x.transpose())) < 1e-9);
        }
    }

    #[test]
    fn test_xtx_of_transposed_view_is_xxt() {
        let x = random_matrix(4, 7, 3);
        assert_eq!(xtx(&transpose_view(&x)), xxt(&x));
    }

    #[test]
    fn test_cholesky_round_trip() {
        for seed in 0..10 {
            let x = random_matrix(20, 8, seed);
            let s = xtx(&x);
            let mut l = s.clone();
            let rank = lcholesky(&mut l, CHOLESKY_EPSILON);
            assert_eq!(rank, 8);
            let rebuilt = &l * l.transpose();
            assert!(distance(&rebuilt, &s) < 1e-9);
            for j in 1..8 {
                for i in 0..j {
                    assert_eq!(l[(i, j)], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_cholesky_singular_does_not_fail() {
        let mut x = random_matrix(20, 6, 11);
        // column 3 = column 0 + column 1, column 5 = 2 * column 2
        for i in 0..20 {
            x[(i, 3)] = x[(i, 0)] + x[(i, 1)];
            x[(i, 5)] = 2.0 * x[(i, 2)];
        }
        let s = xtx(&x);
        let mut l = s.clone();
        let rank = lcholesky(&mut l, CHOLESKY_EPSILON);
        assert_eq!(rank, 4);
        assert_eq!(l[(3, 3)], 0.0);
        assert_eq!(l[(5, 5)], 0.0);
        assert!(l.iter().all(|v| v.is_finite()));
        assert!(distance(&(&l * l.transpose()), &s) < 1e-8);
    }

    /// Least squares through X'X = LL' with zero pivots.
    fn fitted_values(x: &DMatrix<f64>, y: &DVector<f64>) -> DVector<f64> {
        let mut l = xtx(x);
        lcholesky(&mut l, CHOLESKY_EPSILON);
        let mut b = x.transpose() * y;
        lsolve(&l, &mut b);
        rsolve(&l, &mut b);
        x * b
    }

    #[test]
    fn test_singular_solutions_agree_across_redundant_constructions() {
        let base = random_matrix(30, 3, 21);
        let y = DVector::from_column_slice(random_matrix(30, 1, 22).as_slice());
        let c0: DVector<f64> = base.column(0).clone_owned();
        let c1: DVector<f64> = base.column(1).clone_owned();
        let c2: DVector<f64> = base.column(2).clone_owned();
        // Both designs span {c0, c1, c2} with one redundant column each.
        let xa = DMatrix::from_columns(&[c0.clone(), c1.clone(), &c0 + &c1, c2.clone()]);
        let xb = DMatrix::from_columns(&[&c0 + &c1, c2.clone(), c1.clone(), &c1 - &c2]);
        let full = DMatrix::from_columns(&[c0, c1, c2]);
        let fa = fitted_values(&xa, &y);
        let fb = fitted_values(&xb, &y);
        let reference = fitted_values(&full, &y);
        assert_relative_eq!(fa, reference, epsilon = 1e-9);
        assert_relative_eq!(fb, reference, epsilon = 1e-9);
    }

    #[test]
    fn test_quadratic_forms() {
        let x = random_matrix(6, 4, 5);
        let s = xtx(&x);
        let v = DVector::from_column_slice(random_matrix(4, 1, 6).as_slice());
        let q = quadratic_form(&s, &v);
        assert!((q - v.dot(&(&s * &v))).abs() < 1e-10);

        let m = random_matrix(4, 3, 7);
        let qm = quadratic_form_matrix(&s, &m);
        assert!(is_symmetric(&qm));
        assert!(distance(&qm, &(m.transpose() * &s * &m)) < 1e-9);
    }

    #[test]
    fn test_symmetrize() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);
        assert_eq!(m[(0, 1)], 3.0);
        assert!(is_symmetric(&m));
        let mut n = DMatrix::from_row_slice(2, 2, &[1.0, 9.0, 4.0, 3.0]);
        reenforce_symmetry(&mut n);
        assert_eq!(n[(0, 1)], 4.0);
    }
}
