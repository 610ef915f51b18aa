use crate::error::PhregError;
use ndarray::Array1;
use tracing::debug;

/// Permutation and index bundle encoding the risk-set structure of a fixed
/// survival dataset.
///
/// Built once by [`preprocess`] and treated as read-only thereafter; every
/// deviance, gradient and Hessian evaluation reduces to prefix-sum lookups
/// through these vectors. Unless noted otherwise the fields are indexed by
/// event-order position.
///
/// Intervals are half-open on the left, `(start, event]`: a subject whose
/// start time coincides with an event time is not in that event's risk set.
#[derive(Debug, Clone)]
pub struct RiskSetIndex {
    /// `event_order[k]` is the native index of the k-th subject in
    /// event-sorted order.
    pub event_order: Vec<usize>,
    /// Permutation over start times; empty for right-censored data.
    pub start_order: Vec<usize>,
    /// Head of the tie block containing position k.
    pub first: Vec<usize>,
    /// Tail of the tie block containing position k.
    pub last: Vec<usize>,
    /// Efron weight `(k - first[k]) / (last[k] + 1 - first[k])`, in [0, 1).
    pub scaling: Array1<f64>,
    /// Count of event times at or before the subject's start time, i.e. the
    /// lower bound of its event window; empty for right-censored data.
    pub start_map: Vec<usize>,
    /// Count of start times strictly before the k-th event time, i.e. the
    /// start-ordered cut realising R(k); empty for right-censored data.
    pub event_map: Vec<usize>,
    /// Status in event order, stored as {0.0, 1.0}.
    pub status: Array1<f64>,
    /// Event times in event order.
    pub event: Array1<f64>,
    /// Start times in event order; empty for right-censored data.
    pub start: Array1<f64>,
}

impl RiskSetIndex {
    /// Number of subjects in the dataset.
    pub fn len(&self) -> usize {
        self.event_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_order.is_empty()
    }

    /// Whether the dataset carries counting-process (start, event] intervals.
    pub fn has_start_times(&self) -> bool {
        !self.start_order.is_empty()
    }
}

/// Build the [`RiskSetIndex`] for a dataset of (start, event, status)
/// triples.
///
/// Pass `start: None` for right-censored data (events only). With start
/// times, every interval must satisfy `start < event`; the risk set of an
/// event at time t is `{ i : start_i < t <= event_i }`.
///
/// The sort is lexicographic on (time, 1 - status, is_start): at equal
/// times, events precede censorings, and both precede newly entering
/// subjects, which realises the `(start, event]` convention.
pub fn preprocess(
    start: Option<&Array1<f64>>,
    event: &Array1<f64>,
    status: &Array1<f64>,
) -> Result<RiskSetIndex, PhregError> {
    let n = event.len();
    if n == 0 {
        return Err(PhregError::InvalidOperation(
            "preprocess: empty dataset".to_string(),
        ));
    }
    if status.len() != n {
        return Err(PhregError::ShapeMismatch(format!(
            "preprocess: status length {} must equal event length {}",
            status.len(),
            n
        )));
    }
    if let Some(start) = start {
        if start.len() != n {
            return Err(PhregError::ShapeMismatch(format!(
                "preprocess: start length {} must equal event length {}",
                start.len(),
                n
            )));
        }
    }
    for i in 0..n {
        if status[i] != 0.0 && status[i] != 1.0 {
            return Err(PhregError::Domain {
                index: i,
                reason: format!("status must be 0 or 1, got {}", status[i]),
            });
        }
        if !event[i].is_finite() {
            return Err(PhregError::Domain {
                index: i,
                reason: "event time must be finite".to_string(),
            });
        }
        if let Some(start) = start {
            if !start[i].is_finite() {
                return Err(PhregError::Domain {
                    index: i,
                    reason: "start time must be finite".to_string(),
                });
            }
            if start[i] >= event[i] {
                return Err(PhregError::Domain {
                    index: i,
                    reason: format!(
                        "start time {} must precede event time {}",
                        start[i], event[i]
                    ),
                });
            }
        }
    }

    let have_start = start.is_some();

    // Stacked table of start and event rows: (time, 1 - status, is_start,
    // native index). Start rows carry a status complement of 1 so they sort
    // with the censorings, after events at the same time.
    let mut rows: Vec<(f64, u8, u8, usize)> = Vec::with_capacity(if have_start { 2 * n } else { n });
    if let Some(start) = start {
        for i in 0..n {
            rows.push((start[i], 1, 1, i));
        }
    }
    for i in 0..n {
        let status_c = if status[i] == 1.0 { 0 } else { 1 };
        rows.push((event[i], status_c, 0, i));
    }
    rows.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    // Single pass over the sorted table. `first_event` is the head of the
    // open tie block; a censored stop closes it and forms a block of its
    // own. Tie detection compares against the previous *event* row only;
    // start rows never interleave inside a tie block.
    let mut event_order = Vec::with_capacity(n);
    let mut start_order = Vec::with_capacity(if have_start { n } else { 0 });
    let mut first = Vec::with_capacity(n);
    let mut event_map = Vec::with_capacity(if have_start { n } else { 0 });
    let mut start_map_sorted = Vec::with_capacity(if have_start { n } else { 0 });
    let mut event_count = 0usize;
    let mut start_count = 0usize;
    let mut first_event: isize = -1;
    let mut num_tied: isize = 1;
    let mut last_event_time: Option<f64> = None;

    for &(time, status_c, is_start, native) in &rows {
        if is_start == 1 {
            start_order.push(native);
            start_map_sorted.push(event_count);
            start_count += 1;
        } else {
            if status_c == 0 {
                if last_event_time == Some(time) {
                    num_tied += 1;
                } else {
                    first_event += num_tied;
                    num_tied = 1;
                }
            } else {
                first_event += num_tied;
                num_tied = 1;
            }
            first.push(first_event as usize);
            if have_start {
                event_map.push(start_count);
            }
            event_order.push(native);
            event_count += 1;
            last_event_time = Some(time);
        }
    }
    debug_assert_eq!(event_count, n);

    // start_map was accumulated per start-sorted row; re-index it per
    // event-ordered subject.
    let start_map: Vec<usize> = if have_start {
        let mut native_map = vec![0usize; n];
        for (p, &j) in start_order.iter().enumerate() {
            native_map[j] = start_map_sorted[p];
        }
        event_order.iter().map(|&j| native_map[j]).collect()
    } else {
        Vec::new()
    };

    // Walk `first` from the tail: inside a tie block `first` is constant
    // while the position advances, so equality marks the block head.
    let mut last = vec![0usize; n];
    let mut last_event: isize = n as isize - 1;
    for k in (0..n).rev() {
        last[k] = last_event as usize;
        if first[k] == k {
            last_event = first[k] as isize - 1;
        }
    }

    let mut scaling = Array1::<f64>::zeros(n);
    for k in 0..n {
        let f = first[k] as f64;
        scaling[k] = (k as f64 - f) / (last[k] as f64 + 1.0 - f);
    }

    let status_ev = Array1::from(event_order.iter().map(|&j| status[j]).collect::<Vec<_>>());
    let event_ev = Array1::from(event_order.iter().map(|&j| event[j]).collect::<Vec<_>>());
    let start_ev = match start {
        Some(start) => Array1::from(event_order.iter().map(|&j| start[j]).collect::<Vec<_>>()),
        None => Array1::zeros(0),
    };

    let n_events = status_ev.iter().filter(|&&s| s == 1.0).count();
    debug!(
        n,
        n_events,
        counting_process = have_start,
        "preprocessed risk-set index"
    );

    Ok(RiskSetIndex {
        event_order,
        start_order,
        first,
        last,
        scaling,
        start_map,
        event_map,
        status: status_ev,
        event: event_ev,
        start: start_ev,
    })
}
