use ndarray::Array1;

/// Preallocated scratch and cached statistics for deviance evaluation.
///
/// The outer optimiser allocates one workspace per fit (one per thread when
/// evaluating several linear predictors concurrently) and passes it into
/// every kernel call; the kernels write strictly in place, so no evaluation
/// allocates. After [`cox_dev`](crate::deviance::cox_dev) the gradient and
/// Hessian diagonal live here in natural order, together with the sufficient
/// statistics (`risk_sums`, `w_avg`, `diag_part`, `exp_w`) that
/// [`hessian_matvec`](crate::deviance::hessian_matvec) consumes.
///
/// `forward_scratch` is a staging buffer clobbered by several kernels; no
/// content survives across calls.
#[derive(Debug, Clone)]
pub struct DevianceWorkspace {
    // event-order copies of the per-subject inputs
    pub(crate) eta_event: Array1<f64>,
    pub(crate) w_event: Array1<f64>,
    pub(crate) exp_w_event: Array1<f64>,
    // natural-order w_i * exp(eta_i)
    pub(crate) exp_w: Array1<f64>,
    // per-event statistics, cached for Hessian products
    pub(crate) risk_sums: Array1<f64>,
    pub(crate) w_avg: Array1<f64>,
    pub(crate) t1: Array1<f64>,
    pub(crate) t2: Array1<f64>,
    pub(crate) diag_part: Array1<f64>,
    // outputs, natural order after cox_dev
    pub(crate) grad: Array1<f64>,
    pub(crate) diag_hessian: Array1<f64>,
    // reverse cumulative-sum tables, length n + 1; the *_arg pair belongs
    // to hessian_matvec so repeated products never clobber the deviance set
    pub(crate) event_cumsum: Array1<f64>,
    pub(crate) start_cumsum: Array1<f64>,
    pub(crate) event_cumsum_arg: Array1<f64>,
    pub(crate) start_cumsum_arg: Array1<f64>,
    // forward cumulative-sum tables, length n + 1, one per accumulator
    // (scaling^i / risk_sums^j moments)
    pub(crate) c01: Array1<f64>,
    pub(crate) c02: Array1<f64>,
    pub(crate) c11: Array1<f64>,
    pub(crate) c12: Array1<f64>,
    pub(crate) c22: Array1<f64>,
    pub(crate) forward_scratch: Array1<f64>,
    // hessian_matvec staging
    pub(crate) risk_sums_arg: Array1<f64>,
    pub(crate) exp_w_arg: Array1<f64>,
    pub(crate) event_values: Array1<f64>,
    // scalars from the most recent deviance evaluation
    pub(crate) loglik: f64,
    pub(crate) loglik_sat: f64,
    pub(crate) deviance: f64,
    pub(crate) ready: bool,
}

impl DevianceWorkspace {
    /// Allocate a workspace for a dataset of `n` subjects.
    pub fn new(n: usize) -> Self {
        DevianceWorkspace {
            eta_event: Array1::zeros(n),
            w_event: Array1::zeros(n),
            exp_w_event: Array1::zeros(n),
            exp_w: Array1::zeros(n),
            risk_sums: Array1::zeros(n),
            w_avg: Array1::zeros(n),
            t1: Array1::zeros(n),
            t2: Array1::zeros(n),
            diag_part: Array1::zeros(n),
            grad: Array1::zeros(n),
            diag_hessian: Array1::zeros(n),
            event_cumsum: Array1::zeros(n + 1),
            start_cumsum: Array1::zeros(n + 1),
            event_cumsum_arg: Array1::zeros(n + 1),
            start_cumsum_arg: Array1::zeros(n + 1),
            c01: Array1::zeros(n + 1),
            c02: Array1::zeros(n + 1),
            c11: Array1::zeros(n + 1),
            c12: Array1::zeros(n + 1),
            c22: Array1::zeros(n + 1),
            forward_scratch: Array1::zeros(n),
            risk_sums_arg: Array1::zeros(n),
            exp_w_arg: Array1::zeros(n),
            event_values: Array1::zeros(n),
            loglik: 0.0,
            loglik_sat: 0.0,
            deviance: 0.0,
            ready: false,
        }
    }

    /// Number of subjects this workspace was sized for.
    pub fn len(&self) -> usize {
        self.grad.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grad.is_empty()
    }

    /// Gradient of the deviance with respect to the linear predictor,
    /// natural order. Valid after a deviance evaluation.
    pub fn gradient(&self) -> &Array1<f64> {
        &self.grad
    }

    /// Diagonal of the deviance Hessian, natural order. Valid after a
    /// deviance evaluation.
    pub fn diag_hessian(&self) -> &Array1<f64> {
        &self.diag_hessian
    }

    /// Per-event weighted risk-set sums from the most recent evaluation,
    /// event order.
    pub fn risk_sums(&self) -> &Array1<f64> {
        &self.risk_sums
    }

    /// Partial log-likelihood from the most recent evaluation.
    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    /// Saturated partial log-likelihood from the most recent evaluation.
    pub fn loglik_sat(&self) -> f64 {
        self.loglik_sat
    }

    /// Deviance from the most recent evaluation.
    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    /// Whether a deviance evaluation has populated the cached statistics.
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}
