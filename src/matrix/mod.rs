//! Dense-matrix kernel used by the filters.
//!
//! Storage is nalgebra's column-major `DMatrix<f64>`. This module adds the
//! strided zero-copy views nalgebra does not expose directly (transpose,
//! diagonal) and the handful of decompositions the filters rely on.

pub mod band;
pub mod determinant;
pub mod symmetric;
pub mod triangular;

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, Dyn, MatrixView, U1};

pub use determinant::DeterminantalTerm;

/// Transposed view of `m` without copying (row stride = nrows, column stride = 1).
pub fn transpose_view(m: &DMatrix<f64>) -> DMatrixView<'_, f64, Dyn, Dyn> {
    let (r, c) = m.shape();
    MatrixView::from_slice_with_strides_generic(m.as_slice(), Dyn(c), Dyn(r), Dyn(r), Dyn(1))
}

/// Main diagonal of `m` as a strided vector view.
pub fn diagonal_view(m: &DMatrix<f64>) -> DVectorView<'_, f64, Dyn, Dyn> {
    let (r, c) = m.shape();
    let k = r.min(c);
    MatrixView::from_slice_with_strides_generic(
        m.as_slice(),
        Dyn(k),
        U1,
        Dyn(r + 1),
        Dyn(r.max(1)),
    )
}

/// Rectangular sub-block `[r0..r0+nr, c0..c0+nc]` of `m`.
pub fn sub_block(
    m: &DMatrix<f64>,
    r0: usize,
    c0: usize,
    nr: usize,
    nc: usize,
) -> DMatrixView<'_, f64> {
    m.view((r0, c0), (nr, nc))
}

/// Mutable rectangular sub-block; writes go to the backing matrix.
pub fn sub_block_mut(
    m: &mut DMatrix<f64>,
    r0: usize,
    c0: usize,
    nr: usize,
    nc: usize,
) -> DMatrixViewMut<'_, f64> {
    m.view_mut((r0, c0), (nr, nc))
}

/// y = A x, one dot product per row.
pub fn mul_by_rows(a: &DMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    DVector::from_fn(a.nrows(), |i, _| a.row(i).tr_dot(x))
}

/// y = A x, accumulated column by column.
pub fn mul_by_columns(a: &DMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(a.nrows());
    for (j, &xj) in x.iter().enumerate() {
        if xj != 0.0 {
            y.axpy(xj, &a.column(j), 1.0);
        }
    }
    y
}

/// Largest absolute difference between two matrices of the same shape.
pub fn distance(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
