use crate::cumsum::forward_cumsum;
use crate::error::PhregError;
use crate::preprocess::{preprocess, RiskSetIndex};
use crate::reorder::{to_event_from_native, to_native_from_event};
use crate::riskset::{forward_prework, sum_over_events, sum_over_risk_set};
use crate::workspace::DevianceWorkspace;
use crate::Ties;
use ndarray::{Array1, Array2};
use tracing::trace;

/// Saturated partial log-likelihood: the maximum attainable under an
/// unrestricted baseline hazard, used to normalise the deviance so that a
/// perfect fit yields exactly 0.
///
/// For each tie block the weighted event mass `s` contributes `-s·ln(s)`;
/// blocks are visited once by skipping positions whose `first` repeats the
/// previous one. `w_cumsum` must have length n + 1.
pub fn compute_sat_loglik(
    first: &[usize],
    last: &[usize],
    weight: &Array1<f64>,
    event_order: &[usize],
    status: &Array1<f64>,
    w_cumsum: &mut Array1<f64>,
) -> Result<f64, PhregError> {
    let n = event_order.len();
    if weight.len() != n || status.len() != n || first.len() != n || last.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "compute_sat_loglik: input lengths must equal {}",
            n
        )));
    }
    if w_cumsum.len() != n + 1 {
        return Err(PhregError::ShapeMismatch(format!(
            "compute_sat_loglik: cumsum buffer length {} must be {}",
            w_cumsum.len(),
            n + 1
        )));
    }

    let mut sum = 0.0;
    w_cumsum[0] = sum;
    for i in 0..n {
        sum += weight[event_order[i]] * status[i];
        w_cumsum[i + 1] = sum;
    }

    let mut loglik_sat = 0.0;
    let mut prev_first: Option<usize> = None;
    for k in 0..n {
        let f = first[k];
        if prev_first != Some(f) {
            let s = w_cumsum[last[k] + 1] - w_cumsum[f];
            if s > 0.0 {
                loglik_sat -= s * s.ln();
            }
        }
        prev_first = Some(f);
    }
    Ok(loglik_sat)
}

/// Cox partial-likelihood deviance, gradient and Hessian diagonal for a
/// centred linear predictor `eta`.
///
/// Writes the gradient and Hessian diagonal into the workspace in natural
/// order, leaves the cached sufficient statistics for [`hessian_matvec`],
/// and returns the deviance `2·(loglik_sat − loglik)`.
pub fn cox_dev(
    eta: &Array1<f64>,
    sample_weight: &Array1<f64>,
    index: &RiskSetIndex,
    efron: bool,
    ws: &mut DevianceWorkspace,
) -> Result<f64, PhregError> {
    let n = index.len();
    if eta.len() != n || sample_weight.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "cox_dev: eta length {} and weight length {} must equal {}",
            eta.len(),
            sample_weight.len(),
            n
        )));
    }
    if ws.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "cox_dev: workspace sized for {} subjects, dataset has {}",
            ws.len(),
            n
        )));
    }

    // exp_w = w·exp(eta), checking the caller contract on the way
    for i in 0..n {
        if !eta[i].is_finite() {
            return Err(PhregError::Domain {
                index: i,
                reason: "non-finite linear predictor".to_string(),
            });
        }
        if sample_weight[i] < 0.0 {
            return Err(PhregError::Domain {
                index: i,
                reason: "negative sample weight".to_string(),
            });
        }
        ws.exp_w[i] = sample_weight[i] * eta[i].exp();
    }

    to_event_from_native(eta, &index.event_order, &mut ws.eta_event)?;
    to_event_from_native(sample_weight, &index.event_order, &mut ws.w_event)?;
    to_event_from_native(&ws.exp_w, &index.event_order, &mut ws.exp_w_event)?;

    ws.loglik_sat = compute_sat_loglik(
        &index.first,
        &index.last,
        sample_weight,
        &index.event_order,
        &index.status,
        &mut ws.c01,
    )?;

    sum_over_risk_set(
        &ws.exp_w,
        index,
        efron,
        &mut ws.event_cumsum,
        &mut ws.start_cumsum,
        &mut ws.risk_sums,
    )?;

    // the weight cumsum only feeds w_avg, so it can borrow the first
    // forward table before the accumulators overwrite it
    forward_cumsum(&ws.w_event, &mut ws.c01)?;
    for k in 0..n {
        let f = index.first[k];
        let l = index.last[k];
        ws.w_avg[k] = (ws.c01[l + 1] - ws.c01[f]) / (l + 1 - f) as f64;
    }

    let mut loglik = 0.0;
    for k in 0..n {
        if index.status[k] == 1.0 {
            let rs = ws.risk_sums[k];
            if rs <= 0.0 {
                return Err(PhregError::Domain {
                    index: k,
                    reason: "non-positive risk sum at an observed event".to_string(),
                });
            }
            loglik += ws.w_event[k] * ws.eta_event[k] - rs.ln() * ws.w_avg[k];
        }
    }

    // forward accumulator tables; the length-(n+1) cumsums put a zero
    // sentinel under every first(k)/start_map(k) lookup
    forward_prework(
        &index.status,
        Some(&ws.w_avg),
        &index.scaling,
        &ws.risk_sums,
        0,
        1,
        None,
        &mut ws.forward_scratch,
    )?;
    forward_cumsum(&ws.forward_scratch, &mut ws.c01)?;
    forward_prework(
        &index.status,
        Some(&ws.w_avg),
        &index.scaling,
        &ws.risk_sums,
        0,
        2,
        None,
        &mut ws.forward_scratch,
    )?;
    forward_cumsum(&ws.forward_scratch, &mut ws.c02)?;

    if !efron {
        if index.has_start_times() {
            for k in 0..n {
                let l1 = index.last[k] + 1;
                let sm = index.start_map[k];
                ws.t1[k] = ws.c01[l1] - ws.c01[sm];
                ws.t2[k] = ws.c02[l1] - ws.c02[sm];
            }
        } else {
            for k in 0..n {
                let l1 = index.last[k] + 1;
                ws.t1[k] = ws.c01[l1];
                ws.t2[k] = ws.c02[l1];
            }
        }
    } else {
        forward_prework(
            &index.status,
            Some(&ws.w_avg),
            &index.scaling,
            &ws.risk_sums,
            1,
            1,
            None,
            &mut ws.forward_scratch,
        )?;
        forward_cumsum(&ws.forward_scratch, &mut ws.c11)?;
        forward_prework(
            &index.status,
            Some(&ws.w_avg),
            &index.scaling,
            &ws.risk_sums,
            1,
            2,
            None,
            &mut ws.forward_scratch,
        )?;
        forward_cumsum(&ws.forward_scratch, &mut ws.c12)?;
        forward_prework(
            &index.status,
            Some(&ws.w_avg),
            &index.scaling,
            &ws.risk_sums,
            2,
            2,
            None,
            &mut ws.forward_scratch,
        )?;
        forward_cumsum(&ws.forward_scratch, &mut ws.c22)?;

        // inside a tie the discounted risk mass contributes
        // (scaling² − 2·scaling)/risk² on top of the Breslow prefix term
        for k in 0..n {
            let f = index.first[k];
            let l1 = index.last[k] + 1;
            ws.t1[k] = ws.c01[l1] - (ws.c11[l1] - ws.c11[f]);
            ws.t2[k] =
                ws.c02[l1] + (ws.c22[l1] - ws.c22[f]) - 2.0 * (ws.c12[l1] - ws.c12[f]);
        }
        if index.has_start_times() {
            for k in 0..n {
                let sm = index.start_map[k];
                ws.t1[k] -= ws.c01[sm];
                ws.t2[k] -= ws.c02[sm];
            }
        }
    }

    for k in 0..n {
        let dp = ws.exp_w_event[k] * ws.t1[k];
        ws.diag_part[k] = dp;
        ws.grad[k] = -2.0 * (ws.w_event[k] * index.status[k] - dp);
        ws.diag_hessian[k] = -2.0 * (ws.exp_w_event[k] * ws.exp_w_event[k] * ws.t2[k] - dp);
    }

    // back to natural order; each scatter stages through forward_scratch
    to_native_from_event(&mut ws.grad, &index.event_order, &mut ws.forward_scratch)?;
    to_native_from_event(&mut ws.diag_hessian, &index.event_order, &mut ws.forward_scratch)?;
    to_native_from_event(&mut ws.diag_part, &index.event_order, &mut ws.forward_scratch)?;

    ws.loglik = loglik;
    ws.deviance = 2.0 * (ws.loglik_sat - loglik);
    ws.ready = true;
    trace!(
        deviance = ws.deviance,
        loglik,
        loglik_sat = ws.loglik_sat,
        efron,
        "cox deviance evaluated"
    );
    Ok(ws.deviance)
}

/// Product of the deviance Hessian with `arg` (natural order), using the
/// sufficient statistics cached by the most recent [`cox_dev`] on this
/// workspace.
///
/// Under the probabilistic reading p_i(k) = w_i·exp(η_i)/risk_sums[k] for
/// i ∈ R(k), the product is assembled from one risk-set reduction of
/// `exp_w·arg` and one event reduction of the resulting per-event
/// expectations; the diagonal term `diag_part·arg` closes the square.
pub fn hessian_matvec(
    arg: &Array1<f64>,
    index: &RiskSetIndex,
    efron: bool,
    ws: &mut DevianceWorkspace,
    out: &mut Array1<f64>,
) -> Result<(), PhregError> {
    let n = index.len();
    if !ws.ready {
        return Err(PhregError::InvalidOperation(
            "hessian_matvec requires a prior deviance evaluation on this workspace".to_string(),
        ));
    }
    if arg.len() != n || out.len() != n || ws.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "hessian_matvec: arg length {} and output length {} must equal {}",
            arg.len(),
            out.len(),
            n
        )));
    }

    for i in 0..n {
        ws.exp_w_arg[i] = ws.exp_w[i] * arg[i];
    }
    sum_over_risk_set(
        &ws.exp_w_arg,
        index,
        efron,
        &mut ws.event_cumsum_arg,
        &mut ws.start_cumsum_arg,
        &mut ws.risk_sums_arg,
    )?;

    // status·w_avg·E[arg]/risk_sums in one step; censored rows stay 0 so an
    // empty tail risk set cannot produce 0/0
    for k in 0..n {
        ws.forward_scratch[k] = if index.status[k] == 1.0 {
            ws.w_avg[k] * ws.risk_sums_arg[k] / (ws.risk_sums[k] * ws.risk_sums[k])
        } else {
            0.0
        };
    }

    sum_over_events(
        index,
        efron,
        &mut ws.forward_scratch,
        &mut ws.c01,
        &mut ws.c02,
        &mut ws.event_values,
    )?;
    to_native_from_event(&mut ws.event_values, &index.event_order, &mut ws.forward_scratch)?;

    for i in 0..n {
        out[i] = 2.0 * (ws.diag_part[i] * arg[i] - ws.exp_w[i] * ws.event_values[i]);
    }
    trace!(efron, "hessian matvec evaluated");
    Ok(())
}

/// Cox proportional-hazards deviance engine over a fixed survival dataset.
///
/// Preprocesses the dataset once into a [`RiskSetIndex`]; each optimiser
/// step then evaluates deviance, gradient and Hessian diagonal in O(n)
/// through a caller-owned [`DevianceWorkspace`], with Hessian-vector
/// products available against the cached statistics of the latest
/// evaluation.
///
/// ```no_run
/// use ndarray::Array1;
/// use phreg::{CoxDeviance, Ties};
///
/// let event = Array1::from(vec![1.0, 2.0, 3.0]);
/// let status = Array1::from(vec![1.0, 0.0, 1.0]);
/// let model = CoxDeviance::new(&event, &status, Ties::Efron).unwrap();
///
/// let mut ws = model.workspace();
/// let eta = Array1::zeros(3);
/// let weight = Array1::ones(3);
/// let deviance = model.deviance(&eta, &weight, &mut ws).unwrap();
/// let gradient = ws.gradient();
/// ```
#[derive(Debug, Clone)]
pub struct CoxDeviance {
    index: RiskSetIndex,
    ties: Ties,
}

impl CoxDeviance {
    /// Engine for right-censored data (event times only).
    pub fn new(
        event: &Array1<f64>,
        status: &Array1<f64>,
        ties: Ties,
    ) -> Result<Self, PhregError> {
        Ok(CoxDeviance {
            index: preprocess(None, event, status)?,
            ties,
        })
    }

    /// Engine for left-truncated / counting-process data with
    /// `(start, event]` observation intervals.
    pub fn with_start(
        start: &Array1<f64>,
        event: &Array1<f64>,
        status: &Array1<f64>,
        ties: Ties,
    ) -> Result<Self, PhregError> {
        Ok(CoxDeviance {
            index: preprocess(Some(start), event, status)?,
            ties,
        })
    }

    pub fn n_subjects(&self) -> usize {
        self.index.len()
    }

    pub fn ties(&self) -> Ties {
        self.ties
    }

    /// The read-only permutation and index bundle.
    pub fn index(&self) -> &RiskSetIndex {
        &self.index
    }

    /// Allocate a workspace sized for this dataset. Done once per fit; every
    /// evaluation afterwards is allocation-free.
    pub fn workspace(&self) -> DevianceWorkspace {
        DevianceWorkspace::new(self.index.len())
    }

    /// Deviance of the linear predictor, leaving gradient, Hessian diagonal
    /// and cached statistics in the workspace. `eta` should be centred by
    /// the caller so `exp(eta)` stays in range.
    pub fn deviance(
        &self,
        eta: &Array1<f64>,
        sample_weight: &Array1<f64>,
        ws: &mut DevianceWorkspace,
    ) -> Result<f64, PhregError> {
        cox_dev(eta, sample_weight, &self.index, self.ties == Ties::Efron, ws)
    }

    /// Deviance-Hessian product against the statistics cached by the most
    /// recent [`deviance`](Self::deviance) call on `ws`.
    pub fn hessian_matvec(
        &self,
        arg: &Array1<f64>,
        ws: &mut DevianceWorkspace,
        out: &mut Array1<f64>,
    ) -> Result<(), PhregError> {
        hessian_matvec(arg, &self.index, self.ties == Ties::Efron, ws, out)
    }

    /// Dense deviance Hessian assembled column by column through
    /// [`hessian_matvec`](Self::hessian_matvec). Convenience for small
    /// problems and direct Newton solves; allocates the matrix.
    pub fn information(&self, ws: &mut DevianceWorkspace) -> Result<Array2<f64>, PhregError> {
        let n = self.index.len();
        let mut basis = Array1::<f64>::zeros(n);
        let mut column = Array1::<f64>::zeros(n);
        let mut info = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            basis[j] = 1.0;
            self.hessian_matvec(&basis, ws, &mut column)?;
            info.column_mut(j).assign(&column);
            basis[j] = 0.0;
        }
        Ok(info)
    }
}
