//! Common test helpers for UD filter integration tests

#![cfg(feature = "alloc")]
#![allow(dead_code)]

use nalgebra::{dmatrix, dvector, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use udfilter::filters::ud::UdFilter;
use udfilter::models::{
    IntegratedOrnsteinUhlenbeck, LinearPredictModel, LinearUncorrelatedObserveModel,
};

// ============================================================================
// Position / Velocity Scenario
// ============================================================================

/// Time step
pub const DT: f64 = 0.01;
/// Velocity noise, bounding the mean squared speed
pub const V_NOISE: f64 = 0.1;
/// Velocity correlation rate
pub const V_GAMMA: f64 = 1.0;
/// Initial position standard deviation
pub const INITIAL_POSITION_SIGMA: f64 = 1000.0;
/// Initial velocity standard deviation
pub const INITIAL_VELOCITY_SIGMA: f64 = 10.0;
/// Time between position observations
pub const OBS_INTERVAL: f64 = 0.1;
/// Position observation standard deviation
pub const OBS_NOISE: f64 = 0.001;

/// Installs a test logger; repeated calls are harmless.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic random number generator for reproducible scenarios.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draws one zero mean normal sample.
pub fn normal_sample(rng: &mut StdRng, sigma: f64) -> f64 {
    Normal::new(0.0, sigma).unwrap().sample(rng)
}

/// IOU prediction and position observation models.
pub fn make_pv_models() -> (IntegratedOrnsteinUhlenbeck<f64>, LinearUncorrelatedObserveModel<f64>) {
    let predict = IntegratedOrnsteinUhlenbeck::new(DT, V_NOISE, V_GAMMA);
    let observe =
        LinearUncorrelatedObserveModel::new(dmatrix![1.0, 0.0], dvector![OBS_NOISE * OBS_NOISE])
            .unwrap();
    (predict, observe)
}

/// Position / velocity filter initialised at `guess` with a broad prior.
pub fn make_pv_filter(guess: DVector<f64>) -> UdFilter<f64> {
    let mut filter = UdFilter::new(2, 2, 1).unwrap();
    let covariance = DMatrix::from_diagonal(&dvector![
        INITIAL_POSITION_SIGMA * INITIAL_POSITION_SIGMA,
        INITIAL_VELOCITY_SIGMA * INITIAL_VELOCITY_SIGMA
    ]);
    filter.init_kalman(&guess, &covariance).unwrap();
    filter
}

// ============================================================================
// Planar Constant Velocity Scenario
// ============================================================================

/// Constant velocity model for state [x, y, vx, vy] with acceleration noise.
pub fn make_cv_model(dt: f64, accel_sigma: f64) -> LinearPredictModel<f64> {
    let fx = dmatrix![
        1.0, 0.0, dt, 0.0;
        0.0, 1.0, 0.0, dt;
        0.0, 0.0, 1.0, 0.0;
        0.0, 0.0, 0.0, 1.0
    ];
    let half = 0.5 * dt * dt;
    let g = dmatrix![
        half, 0.0;
        0.0, half;
        dt, 0.0;
        0.0, dt
    ];
    let variance = accel_sigma * accel_sigma;
    LinearPredictModel::new(fx, g, dvector![variance, variance]).unwrap()
}

/// Euclidean distance between the position components of two states.
pub fn position_error(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}
