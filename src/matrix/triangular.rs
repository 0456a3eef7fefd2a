//! Products and solves with lower-triangular matrices.
//!
//! Only the lower triangle of `l` is read. Solves follow the zero-pivot
//! convention of [`lcholesky`](super::symmetric::lcholesky): a zero diagonal
//! entry marks a structurally absent direction and the corresponding
//! component of the solution is set to zero.

use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, Dyn, Matrix, U1};

/// b <- L^{-1} b.
pub fn lsolve<S: StorageMut<f64, Dyn, U1>>(l: &DMatrix<f64>, b: &mut Matrix<f64, Dyn, U1, S>) {
    let n = l.nrows();
    for i in 0..n {
        let d = l[(i, i)];
        if d == 0.0 {
            b[i] = 0.0;
            continue;
        }
        let mut v = b[i];
        for k in 0..i {
            v -= l[(i, k)] * b[k];
        }
        b[i] = v / d;
    }
}

/// b <- L'^{-1} b.
pub fn rsolve<S: StorageMut<f64, Dyn, U1>>(l: &DMatrix<f64>, b: &mut Matrix<f64, Dyn, U1, S>) {
    let n = l.nrows();
    for i in (0..n).rev() {
        let d = l[(i, i)];
        if d == 0.0 {
            b[i] = 0.0;
            continue;
        }
        let mut v = b[i];
        for k in (i + 1)..n {
            v -= l[(k, i)] * b[k];
        }
        b[i] = v / d;
    }
}

/// x <- L x.
pub fn lmul<S: StorageMut<f64, Dyn, U1>>(l: &DMatrix<f64>, x: &mut Matrix<f64, Dyn, U1, S>) {
    let n = l.nrows();
    for i in (0..n).rev() {
        let mut v = 0.0;
        for k in 0..=i {
            v += l[(i, k)] * x[k];
        }
        x[i] = v;
    }
}

/// x <- L' x.
pub fn umul<S: StorageMut<f64, Dyn, U1>>(l: &DMatrix<f64>, x: &mut Matrix<f64, Dyn, U1, S>) {
    let n = l.nrows();
    for i in 0..n {
        let mut v = 0.0;
        for k in i..n {
            v += l[(k, i)] * x[k];
        }
        x[i] = v;
    }
}

/// B <- L^{-1} B, column by column.
pub fn lsolve_matrix(l: &DMatrix<f64>, b: &mut DMatrix<f64>) {
    for mut c in b.column_iter_mut() {
        let n = c.len();
        for i in 0..n {
            let d = l[(i, i)];
            if d == 0.0 {
                c[i] = 0.0;
                continue;
            }
            let mut v = c[i];
            for k in 0..i {
                v -= l[(i, k)] * c[k];
            }
            c[i] = v / d;
        }
    }
}

/// B <- B L'^{-1}, i.e. solves X L' = B row by row.
pub fn rsolve_matrix(l: &DMatrix<f64>, b: &mut DMatrix<f64>) {
    let n = l.nrows();
    for r in 0..b.nrows() {
        // X L' = B  <=>  L X' = B'
        for i in 0..n {
            let d = l[(i, i)];
            if d == 0.0 {
                b[(r, i)] = 0.0;
                continue;
            }
            let mut v = b[(r, i)];
            for k in 0..i {
                v -= l[(i, k)] * b[(r, k)];
            }
            b[(r, i)] = v / d;
        }
    }
}

/// Inverse of a lower-triangular matrix (zero pivots give zero rows).
pub fn inverse_lower(l: &DMatrix<f64>) -> DMatrix<f64> {
    let mut inv = DMatrix::identity(l.nrows(), l.nrows());
    lsolve_matrix(l, &mut inv);
    inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::distance;
    use crate::matrix::symmetric::{lcholesky, xtx, CHOLESKY_EPSILON};
    use crate::matrix::testing::random_matrix;
    use nalgebra::DVector;

    fn lower_factor(n: usize, seed: u64) -> DMatrix<f64> {
        let mut l = xtx(&random_matrix(2 * n, n, seed));
        lcholesky(&mut l, CHOLESKY_EPSILON);
        l
    }

    #[test]
    fn test_solves_invert_products() {
        let l = lower_factor(6, 4);
        let x = DVector::from_column_slice(random_matrix(6, 1, 9).as_slice());

        let mut y = x.clone();
        lmul(&l, &mut y);
        assert!((&y - &l * &x).amax() < 1e-10);
        lsolve(&l, &mut y);
        assert!((&y - &x).amax() < 1e-10);

        let mut z = x.clone();
        umul(&l, &mut z);
        assert!((&z - l.transpose() * &x).amax() < 1e-10);
        rsolve(&l, &mut z);
        assert!((&z - &x).amax() < 1e-10);
    }

    #[test]
    fn test_matrix_solves() {
        let l = lower_factor(5, 2);
        let b = random_matrix(5, 3, 8);
        let mut x = b.clone();
        lsolve_matrix(&l, &mut x);
        assert!(distance(&(&l * &x), &b) < 1e-10);

        let c = random_matrix(4, 5, 12);
        let mut y = c.clone();
        rsolve_matrix(&l, &mut y);
        assert!(distance(&(&y * l.transpose()), &c) < 1e-10);

        let inv = inverse_lower(&l);
        assert!(distance(&(&l * &inv), &DMatrix::identity(5, 5)) < 1e-10);
    }

    #[test]
    fn test_zero_pivot_yields_zero_component() {
        let l = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let mut b = DVector::from_vec(vec![2.0, 5.0, 3.0]);
        lsolve(&l, &mut b);
        assert_eq!(b[1], 0.0);
        assert_eq!(b[0], 1.0);
        assert_eq!(b[2], 2.0);
    }

    #[test]
    fn test_solve_on_column_view() {
        let l = lower_factor(4, 6);
        let mut m = random_matrix(4, 2, 13);
        let expected = {
            let mut c: DVector<f64> = m.column(1).clone_owned();
            lsolve(&l, &mut c);
            c
        };
        let mut col = m.column_mut(1);
        lsolve(&l, &mut col);
        assert!((m.column(1) - expected).amax() < 1e-14);
    }
}
