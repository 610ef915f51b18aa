pub mod cumsum;
pub mod deviance;
pub mod error;
pub mod preprocess;
pub mod reorder;
pub mod riskset;
pub mod workspace;

pub use cumsum::{forward_cumsum, reverse_cumsums};
pub use deviance::{compute_sat_loglik, cox_dev, hessian_matvec, CoxDeviance};
pub use error::PhregError;
pub use preprocess::{preprocess, RiskSetIndex};
pub use reorder::{to_event_from_native, to_native_from_event};
pub use riskset::{forward_prework, sum_over_events, sum_over_risk_set};
pub use workspace::DevianceWorkspace;

/// Handling of tied event times in the partial likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ties {
    /// Breslow approximation: every tied event sees the full tie-inclusive
    /// risk set. Cheapest; biased towards zero with heavy ties.
    Breslow,
    /// Efron approximation: successive tied events see linearly discounted
    /// tied contributions, halfway between Breslow and the exact partial
    /// likelihood. Matches Breslow exactly when no ties exist.
    Efron,
}
