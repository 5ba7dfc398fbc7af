//! Integration tests for position / velocity tracking with the UD filter
//!
//! A target following an Integrated Ornstein-Uhlenbeck process is observed
//! in position only; the filter must recover both position and velocity
//! from a poor initial guess.

#![cfg(feature = "alloc")]

mod common;

use common::*;
use nalgebra::dvector;
use udfilter::models::{LinearCorrelatedObserver, LinrzPredictModel};

#[test]
fn test_iou_track_converges() {
    init_logging();
    let mut rng = seeded_rng(42);
    let (predict, observe) = make_pv_models();

    let mut x_true = dvector![1000.0, 1.0];
    let mut filter = make_pv_filter(dvector![900.0, 1.5]);

    let mut time = 0.0;
    let mut obs_time = 0.0;
    let mut observations = 0;
    for _ in 0..100 {
        // Truth follows the model with a random velocity perturbation
        x_true = predict.predict(&x_true);
        x_true[1] += normal_sample(&mut rng, 1.0) * V_NOISE * V_NOISE / (2.0 * V_GAMMA);

        let rcond = filter.predict(&predict).unwrap();
        assert!(rcond > 0.0);
        time += DT;

        if obs_time <= time {
            let z = dvector![x_true[0] + normal_sample(&mut rng, OBS_NOISE)];
            let rcond = filter.observe_uncorrelated(&observe, &z).unwrap();
            assert!(rcond > filter.limit().limit());
            obs_time += OBS_INTERVAL;
            observations += 1;
        }
    }
    filter.update();

    assert!(observations >= 9);
    let estimate = filter.mean();
    assert!(
        (estimate[0] - x_true[0]).abs() < 0.1,
        "position {} vs true {}",
        estimate[0],
        x_true[0]
    );
    assert!(
        (estimate[1] - x_true[1]).abs() < 0.3,
        "velocity {} vs true {}",
        estimate[1],
        x_true[1]
    );

    // Position is known to a few observation sigmas, far below the prior
    let covariance = filter.covariance();
    assert!(covariance[(0, 0)] > 0.0 && covariance[(0, 0)] < 1e-4);
    assert!(covariance[(1, 1)] > 0.0 && covariance[(1, 1)] < 1.0);
    assert!((covariance[(0, 1)] - covariance[(1, 0)]).abs() < 1e-12);
}

#[test]
fn test_iou_observe_variants_track_identically() {
    init_logging();
    let mut rng = seeded_rng(7);
    let (predict, observe) = make_pv_models();
    let correlated = LinearCorrelatedObserver::from_uncorrelated(&observe);

    let mut x_true = dvector![1000.0, 1.0];
    let mut direct = make_pv_filter(dvector![900.0, 1.5]);
    let mut sequential = direct.clone();
    let mut decorrelated = direct.clone();

    for step in 0..50 {
        x_true = predict.predict(&x_true);
        direct.predict(&predict).unwrap();
        sequential.predict(&predict).unwrap();
        decorrelated.predict(&predict).unwrap();

        if step % 10 == 0 {
            let z = dvector![x_true[0] + normal_sample(&mut rng, OBS_NOISE)];
            direct.observe_uncorrelated(&observe, &z).unwrap();
            sequential.observe_sequential(&observe, &z).unwrap();
            decorrelated.observe_linear_correlated(&correlated, &z).unwrap();
        }
    }

    for other in [&mut sequential, &mut decorrelated] {
        other.update();
        assert!((other.mean()[0] - direct.mean()[0]).abs() < 1e-9);
        assert!((other.mean()[1] - direct.mean()[1]).abs() < 1e-9);
    }
}

#[test]
fn test_prediction_only_grows_uncertainty() {
    init_logging();
    let (predict, _) = make_pv_models();
    let mut filter = make_pv_filter(dvector![0.0, 1.0]);

    filter.update();
    let mut previous = filter.covariance()[(0, 0)];
    let mut expected = dvector![0.0, 1.0];
    for _ in 0..10 {
        expected = predict.predict(&expected);
        filter.predict(&predict).unwrap();
        filter.update();
        let variance = filter.covariance()[(0, 0)];
        assert!(variance > previous);
        previous = variance;
    }
    assert!((filter.mean()[0] - expected[0]).abs() < 1e-12);
    assert!((filter.mean()[1] - expected[1]).abs() < 1e-12);
}
