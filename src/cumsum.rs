use crate::error::PhregError;
use ndarray::Array1;

/// Running sum of `sequence` with a 0 padded at the beginning.
///
/// `output[0] = 0` and `output[i] = sequence[0] + … + sequence[i-1]`, so the
/// sum over any half-open range `[lo, hi)` of the input reads as
/// `output[hi] - output[lo]`.
pub fn forward_cumsum(sequence: &Array1<f64>, output: &mut Array1<f64>) -> Result<(), PhregError> {
    if sequence.len() + 1 != output.len() {
        return Err(PhregError::ShapeMismatch(format!(
            "forward_cumsum: output length {} must be one longer than input length {}",
            output.len(),
            sequence.len()
        )));
    }

    let mut sum = 0.0;
    output[0] = sum;
    for i in 1..output.len() {
        sum += sequence[i - 1];
        output[i] = sum;
    }
    Ok(())
}

/// Reversed running sums of `sequence` in event and/or start order, with a
/// 0 padded at the end.
///
/// For each requested buffer, position i holds the sum of `sequence` over
/// all subjects at or after sorted position i, and `buffer[n] = 0`. The tail
/// sentinel is the mirror of [`forward_cumsum`]'s head sentinel: every
/// downstream risk-set or event-set sum becomes a single
/// `buffer[lo] - buffer[hi]` lookup with no off-by-one.
pub fn reverse_cumsums(
    sequence: &Array1<f64>,
    event_buffer: Option<&mut Array1<f64>>,
    start_buffer: Option<&mut Array1<f64>>,
    event_order: &[usize],
    start_order: &[usize],
) -> Result<(), PhregError> {
    let n = sequence.len();

    if let Some(buffer) = event_buffer {
        if n + 1 != buffer.len() {
            return Err(PhregError::ShapeMismatch(format!(
                "reverse_cumsums: event buffer length {} must be one longer than input length {}",
                buffer.len(),
                n
            )));
        }
        if event_order.len() != n {
            return Err(PhregError::ShapeMismatch(format!(
                "reverse_cumsums: event_order length {} must equal input length {}",
                event_order.len(),
                n
            )));
        }
        let mut sum = 0.0;
        buffer[n] = sum;
        for i in (0..n).rev() {
            sum += sequence[event_order[i]];
            buffer[i] = sum;
        }
    }

    if let Some(buffer) = start_buffer {
        if n + 1 != buffer.len() {
            return Err(PhregError::ShapeMismatch(format!(
                "reverse_cumsums: start buffer length {} must be one longer than input length {}",
                buffer.len(),
                n
            )));
        }
        if start_order.len() != n {
            return Err(PhregError::ShapeMismatch(format!(
                "reverse_cumsums: start_order length {} must equal input length {}",
                start_order.len(),
                n
            )));
        }
        let mut sum = 0.0;
        buffer[n] = sum;
        for i in (0..n).rev() {
            sum += sequence[start_order[i]];
            buffer[i] = sum;
        }
    }

    Ok(())
}
