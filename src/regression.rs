//! Regression with ARIMA errors: `y = X b + u`, `u ~ ARIMA`.
//!
//! y and the columns of X are differenced, whitened by one of the fast ARMA
//! filters and the coefficients solved by least squares on the whitened data.

use nalgebra::{DMatrix, DVector};
use tracing::instrument;

use crate::arma_filters::ArmaFilter;
use crate::error::{Result, SsfError};
use crate::likelihood::{ConcentratedLikelihood, Likelihood};
use crate::matrix::symmetric::{lcholesky, xtx, CHOLESKY_EPSILON};
use crate::matrix::triangular::{lsolve, rsolve};
use crate::model::ArimaModel;
use crate::polynomial::apply_filter;
use crate::types::ArmaFilterKind;

#[derive(Debug, Clone)]
pub struct RegArimaModel {
    pub y: Vec<f64>,
    /// `n x nx` regressors, one column per variable.
    pub x: DMatrix<f64>,
    pub arima: ArimaModel,
}

impl RegArimaModel {
    pub fn new(y: Vec<f64>, x: DMatrix<f64>, arima: ArimaModel) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(SsfError::DimensionMismatch {
                what: "regression variables",
                expected: y.len(),
                got: x.nrows(),
            });
        }
        Ok(Self { y, x, arima })
    }

    /// Model without regression variables.
    pub fn without_regressors(y: Vec<f64>, arima: ArimaModel) -> Self {
        let n = y.len();
        Self {
            y,
            x: DMatrix::zeros(n, 0),
            arima,
        }
    }

    pub fn nx(&self) -> usize {
        self.x.ncols()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentratedLikelihoodComputer {
    kind: ArmaFilterKind,
}

impl ConcentratedLikelihoodComputer {
    pub fn new(kind: ArmaFilterKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ArmaFilterKind {
        self.kind
    }

    #[instrument(skip_all, fields(n = model.y.len(), nx = model.nx(), filter = self.kind.name()))]
    pub fn compute(&self, model: &RegArimaModel) -> Result<ConcentratedLikelihood> {
        self.compute_with(&model.arima, &model.y, &model.x)
    }

    /// Same as [`compute`](Self::compute) on borrowed parts, for callers
    /// that re-evaluate one data set under many models.
    pub fn compute_with(
        &self,
        arima: &ArimaModel,
        y: &[f64],
        x: &DMatrix<f64>,
    ) -> Result<ConcentratedLikelihood> {
        let diff = &arima.diff;
        let dy = apply_filter(diff, y);
        if dy.is_empty() {
            return Err(SsfError::DataError(format!(
                "{} observations do not survive differencing of degree {}",
                y.len(),
                arima.k_diff()
            )));
        }
        let n = dy.len();
        let nx = x.ncols();

        let mut filter = self.kind.create();
        let len = filter.prepare(&arima.stationary(), n)?;
        let ey = whiten(filter.as_ref(), &dy, len)?;
        let mut ex = DMatrix::zeros(len, nx);
        for j in 0..nx {
            let column: Vec<f64> = x.column(j).iter().copied().collect();
            let dx = apply_filter(diff, &column);
            ex.set_column(j, &whiten(filter.as_ref(), &dx, len)?);
        }

        let mut l = xtx(&ex);
        let rank = lcholesky(&mut l, CHOLESKY_EPSILON);
        let mut b = ex.tr_mul(&ey);
        lsolve(&l, &mut b);
        rsolve(&l, &mut b);

        let e = &ey - &ex * &b;
        let ssq = e.dot(&e);
        let likelihood = Likelihood::new(n, filter.log_determinant(), ssq);
        Ok(ConcentratedLikelihood::new(
            likelihood,
            b,
            e.as_slice().to_vec(),
            l,
            rank,
        ))
    }
}

fn whiten(filter: &dyn ArmaFilter, y: &[f64], len: usize) -> Result<DVector<f64>> {
    let mut out = vec![0.0; len];
    filter.apply(y, &mut out)?;
    Ok(DVector::from_vec(out))
}
