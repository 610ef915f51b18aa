use crate::cumsum::{forward_cumsum, reverse_cumsums};
use crate::error::PhregError;
use crate::preprocess::RiskSetIndex;
use ndarray::Array1;

/// Stage the weighted moment vector
/// `status · w_avg · scaling^scaling_pow / risk_sums^risk_pow · arg`
/// into `moment_buffer` (event order), ready to be forward cumulative-summed
/// into one of the per-event accumulator tables.
///
/// `w_avg` and `arg` are optional factors. Rows with status 0 are written as
/// exactly 0 without touching the division, so a zero risk sum on a censored
/// row cannot poison the cumsums.
pub fn forward_prework(
    status: &Array1<f64>,
    w_avg: Option<&Array1<f64>>,
    scaling: &Array1<f64>,
    risk_sums: &Array1<f64>,
    scaling_pow: i32,
    risk_pow: i32,
    arg: Option<&Array1<f64>>,
    moment_buffer: &mut Array1<f64>,
) -> Result<(), PhregError> {
    let n = status.len();
    if moment_buffer.len() != n || scaling.len() != n || risk_sums.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "forward_prework: buffer lengths must equal status length {}",
            n
        )));
    }

    for k in 0..n {
        if status[k] == 0.0 {
            moment_buffer[k] = 0.0;
            continue;
        }
        let mut value = scaling[k].powi(scaling_pow) / risk_sums[k].powi(risk_pow);
        if let Some(w_avg) = w_avg {
            value *= w_avg[k];
        }
        if let Some(arg) = arg {
            value *= arg[k];
        }
        moment_buffer[k] = value;
    }
    Ok(())
}

/// Per-event risk-set sums of a natural-order vector:
/// `risk_sums[k] = Σ_{i ∈ R(k)} arg[i]`, in event order.
///
/// Reverse cumulative sums of `arg` are written into `event_cumsum` (and,
/// under counting-process data, `start_cumsum`); each risk set is then a
/// single prefix-sum difference. With `efron`, the tied contribution is
/// discounted linearly across the tie block, so the m sums inside a tie
/// step from the full tie-inclusive sum down by (m-1)/m of the tied mass.
pub fn sum_over_risk_set(
    arg: &Array1<f64>,
    index: &RiskSetIndex,
    efron: bool,
    event_cumsum: &mut Array1<f64>,
    start_cumsum: &mut Array1<f64>,
    risk_sums: &mut Array1<f64>,
) -> Result<(), PhregError> {
    let n = index.len();
    if arg.len() != n || risk_sums.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "sum_over_risk_set: arg length {} and output length {} must equal {}",
            arg.len(),
            risk_sums.len(),
            n
        )));
    }

    let have_start = index.has_start_times();
    reverse_cumsums(
        arg,
        Some(&mut *event_cumsum),
        if have_start { Some(&mut *start_cumsum) } else { None },
        &index.event_order,
        &index.start_order,
    )?;

    if have_start {
        for k in 0..n {
            risk_sums[k] = event_cumsum[index.first[k]] - start_cumsum[index.event_map[k]];
        }
    } else {
        for k in 0..n {
            risk_sums[k] = event_cumsum[index.first[k]];
        }
    }

    if efron {
        for k in 0..n {
            risk_sums[k] -=
                (event_cumsum[index.first[k]] - event_cumsum[index.last[k] + 1]) * index.scaling[k];
        }
    }
    Ok(())
}

/// Transpose of [`sum_over_risk_set`]: given per-event weights in
/// `forward_scratch` (event order), accumulate for each position k the sum
/// over all events whose risk set contains subject k.
///
/// `forward_scratch` is clobbered when the Efron correction rescales it in
/// place; its contents after the call are unspecified.
pub fn sum_over_events(
    index: &RiskSetIndex,
    efron: bool,
    forward_scratch: &mut Array1<f64>,
    cumsum: &mut Array1<f64>,
    cumsum_scaled: &mut Array1<f64>,
    values: &mut Array1<f64>,
) -> Result<(), PhregError> {
    let n = index.len();
    if forward_scratch.len() != n || values.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "sum_over_events: scratch length {} and output length {} must equal {}",
            forward_scratch.len(),
            values.len(),
            n
        )));
    }

    forward_cumsum(forward_scratch, cumsum)?;
    if index.has_start_times() {
        for k in 0..n {
            values[k] = cumsum[index.last[k] + 1] - cumsum[index.start_map[k]];
        }
    } else {
        for k in 0..n {
            values[k] = cumsum[index.last[k] + 1];
        }
    }

    if efron {
        for k in 0..n {
            forward_scratch[k] *= index.scaling[k];
        }
        forward_cumsum(forward_scratch, cumsum_scaled)?;
        for k in 0..n {
            values[k] -= cumsum_scaled[index.last[k] + 1] - cumsum_scaled[index.first[k]];
        }
    }
    Ok(())
}
