use ndarray::Array1;
use phreg::{compute_sat_loglik, CoxDeviance, PhregError, Ties};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LN2: f64 = std::f64::consts::LN_2;

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * (1.0 + b.abs())
}

// Central-difference gradient of the deviance.
fn fd_gradient(model: &CoxDeviance, eta: &Array1<f64>, weight: &Array1<f64>) -> Array1<f64> {
    let n = eta.len();
    let h = 1e-5;
    let mut ws = model.workspace();
    let mut grad = Array1::zeros(n);
    for i in 0..n {
        let mut eta_plus = eta.clone();
        eta_plus[i] += h;
        let mut eta_minus = eta.clone();
        eta_minus[i] -= h;
        let d_plus = model.deviance(&eta_plus, weight, &mut ws).unwrap();
        let d_minus = model.deviance(&eta_minus, weight, &mut ws).unwrap();
        grad[i] = (d_plus - d_minus) / (2.0 * h);
    }
    grad
}

fn random_eta(seed: u64, n: usize) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut eta: Array1<f64> = Array1::from((0..n).map(|_| rng.gen_range(-0.7..0.7)).collect::<Vec<_>>());
    // centre, per the caller contract
    let mean = eta.mean().unwrap_or(0.0);
    eta.mapv_inplace(|e| e - mean);
    eta
}

#[test]
fn test_two_subjects_null_eta() {
    let event = Array1::from(vec![1.0, 2.0]);
    let status = Array1::from(vec![1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0]);
    let model = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let mut ws = model.workspace();

    let eta = Array1::zeros(2);
    let deviance = model.deviance(&eta, &weight, &mut ws).unwrap();

    assert!((ws.risk_sums()[0] - 2.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 1.0).abs() < 1e-12);
    assert!((ws.loglik() + LN2).abs() < 1e-12);
    assert!((ws.loglik_sat() - 0.0).abs() < 1e-12);
    assert!((deviance - 2.0 * LN2).abs() < 1e-10);

    // exact hand values for the gradient and Hessian diagonal
    assert!((ws.gradient()[0] + 1.0).abs() < 1e-12);
    assert!((ws.gradient()[1] - 1.0).abs() < 1e-12);
    assert!((ws.diag_hessian()[0] - 0.5).abs() < 1e-12);
    assert!((ws.diag_hessian()[1] - 0.5).abs() < 1e-12);
}

#[test]
fn test_two_subjects_shifted_eta() {
    let event = Array1::from(vec![1.0, 2.0]);
    let status = Array1::from(vec![1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0]);
    let model = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let mut ws = model.workspace();

    let eta = Array1::from(vec![2.0f64.ln(), 0.0]);
    let deviance = model.deviance(&eta, &weight, &mut ws).unwrap();

    assert!((ws.risk_sums()[0] - 3.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 1.0).abs() < 1e-12);
    assert!((ws.loglik() - (2.0f64.ln() - 3.0f64.ln())).abs() < 1e-12);
    assert!((deviance - 0.810930).abs() < 1e-6);
}

#[test]
fn test_tied_events_breslow_vs_efron() {
    let event = Array1::from(vec![1.0, 1.0, 2.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0, 1.0]);
    let eta = Array1::zeros(3);

    let breslow = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let mut ws = breslow.workspace();
    let d_breslow = breslow.deviance(&eta, &weight, &mut ws).unwrap();
    assert!((ws.risk_sums()[0] - 3.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 3.0).abs() < 1e-12);
    assert!((ws.risk_sums()[2] - 1.0).abs() < 1e-12);

    // the tie block carries event mass s = 2, so loglik_sat = -2 ln 2
    assert!((ws.loglik_sat() + 2.0 * LN2).abs() < 1e-12);
    assert!((d_breslow - 4.0 * 1.5f64.ln()).abs() < 1e-10);

    let efron = CoxDeviance::new(&event, &status, Ties::Efron).unwrap();
    let mut ws = efron.workspace();
    let d_efron = efron.deviance(&eta, &weight, &mut ws).unwrap();
    assert!((ws.risk_sums()[0] - 3.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 2.0).abs() < 1e-12);
    assert!((ws.risk_sums()[2] - 1.0).abs() < 1e-12);
    assert!((d_efron - 2.0 * 1.5f64.ln()).abs() < 1e-10);

    // Efron sits strictly below Breslow in deviance here
    assert!(d_efron < d_breslow);
}

#[test]
fn test_delayed_entry_excludes_not_yet_at_risk() {
    // subject 1 enters exactly at subject 0's event time; under
    // (start, event] it is not in that risk set and the null fit is
    // saturated
    let start = Array1::from(vec![0.0, 2.0]);
    let event = Array1::from(vec![2.0, 3.0]);
    let status = Array1::from(vec![1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0]);
    let model = CoxDeviance::with_start(&start, &event, &status, Ties::Breslow).unwrap();
    let mut ws = model.workspace();

    let deviance = model.deviance(&Array1::zeros(2), &weight, &mut ws).unwrap();
    assert!((ws.risk_sums()[0] - 1.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 1.0).abs() < 1e-12);
    assert!(deviance.abs() < 1e-12);
    assert!(ws.gradient().iter().all(|&g| g.abs() < 1e-12));
}

#[test]
fn test_delayed_entry_overlapping_intervals() {
    // subject 1 entered before subject 0's event, so it is at risk there
    let start = Array1::from(vec![0.0, 1.0]);
    let event = Array1::from(vec![2.0, 3.0]);
    let status = Array1::from(vec![1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0]);
    let model = CoxDeviance::with_start(&start, &event, &status, Ties::Breslow).unwrap();
    let mut ws = model.workspace();

    let deviance = model.deviance(&Array1::zeros(2), &weight, &mut ws).unwrap();
    assert!((ws.risk_sums()[0] - 2.0).abs() < 1e-12);
    assert!((ws.risk_sums()[1] - 1.0).abs() < 1e-12);
    assert!((deviance - 2.0 * LN2).abs() < 1e-10);
}

#[test]
fn test_sat_loglik_weighted_ties() {
    let event = Array1::from(vec![1.0, 1.0, 2.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0]);
    let model = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let index = model.index();

    let weight = Array1::from(vec![2.0, 3.0, 1.0]);
    let mut cumsum = Array1::zeros(4);
    let value = compute_sat_loglik(
        &index.first,
        &index.last,
        &weight,
        &index.event_order,
        &index.status,
        &mut cumsum,
    )
    .unwrap();
    // blocks carry masses 5 and 1
    assert!((value - (-5.0 * 5.0f64.ln())).abs() < 1e-12);
}

#[test]
fn test_breslow_equals_efron_without_ties() {
    let event = Array1::from(vec![1.0, 2.5, 3.0, 4.0, 6.0]);
    let status = Array1::from(vec![1.0, 1.0, 0.0, 1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 2.0, 0.5, 1.5, 1.0]);
    let eta = random_eta(1, 5);

    let breslow = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let efron = CoxDeviance::new(&event, &status, Ties::Efron).unwrap();
    let mut ws_b = breslow.workspace();
    let mut ws_e = efron.workspace();

    let d_b = breslow.deviance(&eta, &weight, &mut ws_b).unwrap();
    let d_e = efron.deviance(&eta, &weight, &mut ws_e).unwrap();
    assert!((d_b - d_e).abs() < 1e-12);
    for i in 0..5 {
        assert!((ws_b.gradient()[i] - ws_e.gradient()[i]).abs() < 1e-12);
        assert!((ws_b.diag_hessian()[i] - ws_e.diag_hessian()[i]).abs() < 1e-12);
    }

    let arg = random_eta(2, 5);
    let mut hv_b = Array1::zeros(5);
    let mut hv_e = Array1::zeros(5);
    breslow.hessian_matvec(&arg, &mut ws_b, &mut hv_b).unwrap();
    efron.hessian_matvec(&arg, &mut ws_e, &mut hv_e).unwrap();
    for i in 0..5 {
        assert!((hv_b[i] - hv_e[i]).abs() < 1e-12);
    }
}

#[test]
fn test_breslow_equals_efron_without_ties_counting_process() {
    let start = Array1::from(vec![0.0, 1.0, 0.5, 2.0]);
    let event = Array1::from(vec![2.0, 3.0, 4.0, 5.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 0.0]);
    let weight = Array1::from(vec![1.0, 0.5, 2.0, 1.0]);
    let eta = random_eta(3, 4);

    let breslow = CoxDeviance::with_start(&start, &event, &status, Ties::Breslow).unwrap();
    let efron = CoxDeviance::with_start(&start, &event, &status, Ties::Efron).unwrap();
    let mut ws_b = breslow.workspace();
    let mut ws_e = efron.workspace();

    let d_b = breslow.deviance(&eta, &weight, &mut ws_b).unwrap();
    let d_e = efron.deviance(&eta, &weight, &mut ws_e).unwrap();
    assert!((d_b - d_e).abs() < 1e-12);
    for i in 0..4 {
        assert!((ws_b.gradient()[i] - ws_e.gradient()[i]).abs() < 1e-12);
        assert!((ws_b.diag_hessian()[i] - ws_e.diag_hessian()[i]).abs() < 1e-12);
    }
}

#[test]
fn test_gradient_matches_finite_differences() {
    let event = Array1::from(vec![1.0, 1.0, 2.0, 3.0, 3.0, 4.0, 5.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
    let weight = Array1::from(vec![1.0, 2.0, 0.5, 1.0, 1.5, 1.0, 2.0]);

    for ties in [Ties::Breslow, Ties::Efron] {
        let model = CoxDeviance::new(&event, &status, ties).unwrap();
        let mut ws = model.workspace();
        let eta = random_eta(4, 7);
        model.deviance(&eta, &weight, &mut ws).unwrap();

        let fd = fd_gradient(&model, &eta, &weight);
        for i in 0..7 {
            assert!(
                close(ws.gradient()[i], fd[i], 1e-6),
                "gradient[{}] = {} vs fd {} ({:?})",
                i,
                ws.gradient()[i],
                fd[i],
                ties
            );
        }
    }
}

#[test]
fn test_gradient_matches_finite_differences_counting_process() {
    let start = Array1::from(vec![0.0, 0.0, 1.0, 0.0, 2.0]);
    let event = Array1::from(vec![2.0, 3.0, 3.0, 4.0, 5.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 1.0, 0.0]);
    let weight = Array1::from(vec![1.0, 2.0, 1.5, 0.5, 1.0]);

    for ties in [Ties::Breslow, Ties::Efron] {
        let model = CoxDeviance::with_start(&start, &event, &status, ties).unwrap();
        let mut ws = model.workspace();
        let eta = Array1::from(vec![0.1, -0.2, 0.3, 0.0, -0.1]);
        model.deviance(&eta, &weight, &mut ws).unwrap();

        let fd = fd_gradient(&model, &eta, &weight);
        for i in 0..5 {
            assert!(
                close(ws.gradient()[i], fd[i], 1e-6),
                "gradient[{}] = {} vs fd {} ({:?})",
                i,
                ws.gradient()[i],
                fd[i],
                ties
            );
        }
    }
}

#[test]
fn test_deviance_nonnegative() {
    let event = Array1::from(vec![1.0, 2.0, 2.0, 3.0, 5.0, 6.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 1.0, 2.0, 1.0, 0.5, 1.0]);

    for ties in [Ties::Breslow, Ties::Efron] {
        let model = CoxDeviance::new(&event, &status, ties).unwrap();
        let mut ws = model.workspace();
        for seed in 0..10 {
            let eta = random_eta(seed, 6);
            let deviance = model.deviance(&eta, &weight, &mut ws).unwrap();
            assert!(deviance >= 0.0, "negative deviance {} ({:?})", deviance, ties);
        }
    }
}

#[test]
fn test_zero_weight_equals_removal_breslow() {
    // subject 1 sits inside the tie at t = 1 with weight zero
    let event = Array1::from(vec![1.0, 1.0, 2.0, 3.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 0.0]);
    let weight = Array1::from(vec![1.0, 0.0, 1.0, 1.5]);
    let eta = Array1::from(vec![0.2, -0.4, 0.1, -0.3]);

    let full = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let mut ws_full = full.workspace();
    let d_full = full.deviance(&eta, &weight, &mut ws_full).unwrap();

    let event_r = Array1::from(vec![1.0, 2.0, 3.0]);
    let status_r = Array1::from(vec![1.0, 1.0, 0.0]);
    let weight_r = Array1::from(vec![1.0, 1.0, 1.5]);
    let eta_r = Array1::from(vec![0.2, 0.1, -0.3]);
    let reduced = CoxDeviance::new(&event_r, &status_r, Ties::Breslow).unwrap();
    let mut ws_r = reduced.workspace();
    let d_r = reduced.deviance(&eta_r, &weight_r, &mut ws_r).unwrap();

    assert!((d_full - d_r).abs() < 1e-12);
    let kept = [0usize, 2, 3];
    for (r, &i) in kept.iter().enumerate() {
        assert!((ws_full.gradient()[i] - ws_r.gradient()[r]).abs() < 1e-12);
        assert!((ws_full.diag_hessian()[i] - ws_r.diag_hessian()[r]).abs() < 1e-12);
    }
    // the zero-weight subject contributes nothing
    assert!(ws_full.gradient()[1].abs() < 1e-12);
    assert!(ws_full.diag_hessian()[1].abs() < 1e-12);
}

#[test]
fn test_zero_weight_equals_removal_efron() {
    // the zero-weight subject is untied, where the Efron average is exact
    let event = Array1::from(vec![1.0, 2.0, 3.0, 3.0, 4.0]);
    let status = Array1::from(vec![1.0, 1.0, 1.0, 1.0, 1.0]);
    let weight = Array1::from(vec![1.0, 0.0, 1.0, 2.0, 1.0]);
    let eta = Array1::from(vec![0.1, 0.5, -0.2, 0.0, 0.2]);

    let full = CoxDeviance::new(&event, &status, Ties::Efron).unwrap();
    let mut ws_full = full.workspace();
    let d_full = full.deviance(&eta, &weight, &mut ws_full).unwrap();

    let event_r = Array1::from(vec![1.0, 3.0, 3.0, 4.0]);
    let status_r = Array1::from(vec![1.0, 1.0, 1.0, 1.0]);
    let weight_r = Array1::from(vec![1.0, 1.0, 2.0, 1.0]);
    let eta_r = Array1::from(vec![0.1, -0.2, 0.0, 0.2]);
    let reduced = CoxDeviance::new(&event_r, &status_r, Ties::Efron).unwrap();
    let mut ws_r = reduced.workspace();
    let d_r = reduced.deviance(&eta_r, &weight_r, &mut ws_r).unwrap();

    assert!((d_full - d_r).abs() < 1e-12);
    let kept = [0usize, 2, 3, 4];
    for (r, &i) in kept.iter().enumerate() {
        assert!((ws_full.gradient()[i] - ws_r.gradient()[r]).abs() < 1e-12);
        assert!((ws_full.diag_hessian()[i] - ws_r.diag_hessian()[r]).abs() < 1e-12);
    }
}

#[test]
fn test_rejects_non_finite_eta_and_negative_weight() {
    let event = Array1::from(vec![1.0, 2.0]);
    let status = Array1::from(vec![1.0, 1.0]);
    let model = CoxDeviance::new(&event, &status, Ties::Breslow).unwrap();
    let mut ws = model.workspace();

    let bad_eta = Array1::from(vec![f64::NAN, 0.0]);
    let weight = Array1::from(vec![1.0, 1.0]);
    assert!(matches!(
        model.deviance(&bad_eta, &weight, &mut ws),
        Err(PhregError::Domain { index: 0, .. })
    ));

    let eta = Array1::zeros(2);
    let bad_weight = Array1::from(vec![1.0, -1.0]);
    assert!(matches!(
        model.deviance(&eta, &bad_weight, &mut ws),
        Err(PhregError::Domain { index: 1, .. })
    ));

    let short_eta = Array1::zeros(1);
    assert!(matches!(
        model.deviance(&short_eta, &weight, &mut ws),
        Err(PhregError::ShapeMismatch(_))
    ));
}
