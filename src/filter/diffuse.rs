//! Exact diffuse initialization (Koopman 1997).
//!
//! `P_t = kappa * Pinf_t + Pstar_t`. While `Pinf` is non-zero each position
//! yields two variances, `Finf = Z Pinf Z'` and `Fstar = Z Pstar Z' + H`:
//!
//!   Finf > 0:  a     += Minf v / Finf
//!              Pstar += Minf Minf' Fstar / Finf^2 - (Mstar Minf' + Minf Mstar') / Finf
//!              Pinf  -= Minf Minf' / Finf
//!   Finf = 0:  ordinary update on Pstar
//!
//! with `Minf = Pinf Z'`, `Mstar = Pstar Z'`. Each `Finf > 0` step removes one
//! diffuse direction; after `nd` of them the filter continues as the ordinary
//! one.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::Result;
use crate::filter::ordinary::{predict, update, Accumulator};
use crate::filter::{rank_one_downdate, FilterResults};
use crate::likelihood::Likelihood;
use crate::matrix::symmetric::symmetrize;
use crate::matrix::DeterminantalTerm;
use crate::ssf::Ssf;
use crate::types::{FilterConfig, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffuseStatus {
    /// The diffuse part vanished before position `diffuse_end`.
    Identified { diffuse_end: usize },
    /// The data ran out with `missing` diffuse directions left.
    NotIdentified { missing: usize },
}

#[derive(Debug, Clone)]
pub struct DiffuseFilterResults {
    pub results: FilterResults,
    status: DiffuseStatus,
    diffuse_steps: usize,
    diffuse_end: usize,
}

impl DiffuseFilterResults {
    pub fn status(&self) -> DiffuseStatus {
        self.status
    }

    pub fn is_identified(&self) -> bool {
        matches!(self.status, DiffuseStatus::Identified { .. })
    }

    /// `None` when the diffuse part could not be identified.
    pub fn likelihood(&self) -> Option<&Likelihood> {
        if self.is_identified() {
            Some(&self.results.likelihood)
        } else {
            None
        }
    }

    /// Number of positions with `Finf > 0`.
    pub fn diffuse_steps(&self) -> usize {
        self.diffuse_steps
    }

    /// First position handled by the ordinary recursion.
    pub fn diffuse_end(&self) -> usize {
        self.diffuse_end
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffuseFilter {
    config: FilterConfig,
}

impl DiffuseFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn process(&self, ssf: &Ssf, data: &[f64]) -> Result<DiffuseFilterResults> {
        let nd = ssf.diffuse_dim();
        let storage = self.config.storage;
        let loading = &ssf.measurement.loading;
        let h = ssf.measurement.error_variance;
        let dynamics = ssf.dynamics.as_ref();

        let mut out = FilterResults::with_capacity(data.len(), &self.config);
        let mut a = ssf.initialization.a0();
        let mut pstar = ssf.initialization.pf0();
        let mut pinf = ssf.initialization.pi0();
        let scale = (0..pinf.nrows()).map(|i| pinf[(i, i)]).fold(1.0_f64, f64::max);
        let eps = self.config.diffuse_epsilon * scale;

        let mut acc = Accumulator::new();
        let mut dacc = DeterminantalTerm::new();
        let mut steps = 0;
        let mut diffuse = nd > 0;
        let mut diffuse_end = 0;

        for (t, &y) in data.iter().enumerate() {
            if storage == Storage::Full {
                out.states.push(a.clone());
                out.covariances.push(pstar.clone());
                if diffuse {
                    out.diffuse_covariances.push(pinf.clone());
                }
            }
            if !diffuse {
                if y.is_nan() {
                    out.errors.push(f64::NAN);
                    out.variances.push(loading.zvz(t, &pstar) + h);
                } else {
                    let (v, f) = update(
                        &ssf.measurement,
                        t,
                        y,
                        &mut a,
                        &mut pstar,
                        self.config.zero_variance,
                        &mut acc,
                    )?;
                    out.errors.push(v);
                    out.variances.push(f);
                }
                predict(dynamics, t, &mut a, &mut pstar);
                continue;
            }

            let finf = loading.zvz(t, &pinf);
            if y.is_nan() {
                out.errors.push(f64::NAN);
                out.variances.push(loading.zvz(t, &pstar) + h);
                out.diffuse_variances.push(0.0);
            } else if finf > eps {
                let fstar = loading.zvz(t, &pstar) + h;
                let v = y - loading.zx(t, &a);
                let minf = loading.zm(t, &pinf);
                let mstar = loading.zm(t, &pstar);
                a.axpy(v / finf, &minf, 1.0);
                diffuse_update(&mut pstar, &minf, &mstar, finf, fstar);
                rank_one_downdate(&mut pinf, &minf, finf);
                dacc.add(finf)?;
                steps += 1;
                out.errors.push(v);
                out.variances.push(fstar);
                out.diffuse_variances.push(finf);
            } else {
                let (v, f) = update(
                    &ssf.measurement,
                    t,
                    y,
                    &mut a,
                    &mut pstar,
                    self.config.zero_variance,
                    &mut acc,
                )?;
                out.errors.push(v);
                out.variances.push(f);
                out.diffuse_variances.push(0.0);
            }

            predict(dynamics, t, &mut a, &mut pstar);
            dynamics.tvt(t, &mut pinf);

            if steps == nd {
                diffuse = false;
                diffuse_end = t + 1;
                debug!(position = diffuse_end, steps, "diffuse part collapsed");
            }
        }

        let status = if diffuse {
            diffuse_end = data.len();
            warn!(missing = nd - steps, "diffuse initialization not identified");
            DiffuseStatus::NotIdentified { missing: nd - steps }
        } else {
            DiffuseStatus::Identified { diffuse_end }
        };

        let mut likelihood = acc.likelihood();
        likelihood.diffuse_logdet = dacc.log_determinant();
        likelihood.nd = steps;
        out.final_state = a;
        out.final_covariance = pstar;
        out.likelihood = likelihood;
        Ok(DiffuseFilterResults {
            results: out,
            status,
            diffuse_steps: steps,
            diffuse_end,
        })
    }
}

fn diffuse_update(
    pstar: &mut DMatrix<f64>,
    minf: &DVector<f64>,
    mstar: &DVector<f64>,
    finf: f64,
    fstar: f64,
) {
    let n = minf.len();
    let c = fstar / (finf * finf);
    for j in 0..n {
        for i in 0..n {
            pstar[(i, j)] += minf[i] * minf[j] * c - (mstar[i] * minf[j] + minf[i] * mstar[j]) / finf;
        }
    }
    symmetrize(pstar);
}
