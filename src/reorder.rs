use crate::error::PhregError;
use ndarray::Array1;

/// Gather a natural-order vector into event order: `dest[i] = arg[event_order[i]]`.
pub fn to_event_from_native(
    arg: &Array1<f64>,
    event_order: &[usize],
    dest: &mut Array1<f64>,
) -> Result<(), PhregError> {
    if arg.len() != event_order.len() || dest.len() != event_order.len() {
        return Err(PhregError::ShapeMismatch(format!(
            "to_event_from_native: arg length {}, dest length {} and permutation length {} must agree",
            arg.len(),
            dest.len(),
            event_order.len()
        )));
    }
    for i in 0..event_order.len() {
        dest[i] = arg[event_order[i]];
    }
    Ok(())
}

/// Scatter an event-ordered vector back to natural order in place:
/// `arg[event_order[i]] = old arg[i]`.
///
/// The permutation is applied in place, so `arg` is first staged into
/// `scratch`; the contents of `scratch` after the call are unspecified.
pub fn to_native_from_event(
    arg: &mut Array1<f64>,
    event_order: &[usize],
    scratch: &mut Array1<f64>,
) -> Result<(), PhregError> {
    if arg.len() != event_order.len() || scratch.len() != event_order.len() {
        return Err(PhregError::ShapeMismatch(format!(
            "to_native_from_event: arg length {}, scratch length {} and permutation length {} must agree",
            arg.len(),
            scratch.len(),
            event_order.len()
        )));
    }
    scratch.assign(arg);
    for i in 0..event_order.len() {
        arg[event_order[i]] = scratch[i];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_identity() {
        let arg = Array1::from(vec![10.0, 20.0, 30.0, 40.0]);
        let event_order = vec![3, 1, 0, 2];
        let mut event_ordered = Array1::zeros(4);
        let mut scratch = Array1::zeros(4);

        to_event_from_native(&arg, &event_order, &mut event_ordered).unwrap();
        assert_eq!(event_ordered[0], 40.0);
        assert_eq!(event_ordered[2], 10.0);

        to_native_from_event(&mut event_ordered, &event_order, &mut scratch).unwrap();
        for i in 0..4 {
            assert_eq!(event_ordered[i], arg[i]);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let arg = Array1::from(vec![1.0, 2.0]);
        let mut dest = Array1::zeros(3);
        let result = to_event_from_native(&arg, &[0, 1], &mut dest);
        assert!(matches!(result, Err(PhregError::ShapeMismatch(_))));
    }
}
