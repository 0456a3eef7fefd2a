pub mod error;
pub mod types;
pub mod params;
pub mod polynomial;
pub mod model;
pub mod matrix;
pub mod ssf;
pub mod filter;
pub mod likelihood;
pub mod arma_filters;
pub mod regression;
pub mod forecast;
pub mod batch;
pub mod objective;

#[cfg(feature = "python")]
mod python;

pub use error::{Result, SsfError};
pub use filter::{
    CkmsFilter, CkmsState, DiffuseFilter, DiffuseSmoother, DiffuseStatus, FilterResults, OrdinaryFilter,
    OrdinarySmoother, SmoothingResults,
};
pub use likelihood::{ConcentratedLikelihood, Likelihood};
pub use model::{ArimaModel, ArmaModel};
pub use ssf::{Measurement, MultivariateSsf, Ssf, SsfDynamics, SsfInitialization, SsfLoading};
pub use types::{ArmaFilterKind, FilterConfig, SarimaOrder, Storage};
