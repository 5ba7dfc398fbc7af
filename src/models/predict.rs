//! Prediction (process) models
//!
//! Describes how the state evolves between observations.

use alloc::borrow::Cow;

use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::{FilterError, Result};

/// Trait for linearizable prediction models with additive coupled noise.
///
/// Describes state dynamics in the form:
/// x_{k+1} = f(x_k) + G * w
///
/// where:
/// - f is the (possibly nonlinear) state transition with Jacobian Fx
/// - w is zero-mean noise with diagonal covariance diag(q)
/// - G couples the noise into the state and may have fewer columns than the state
pub trait LinrzPredictModel<T: RealField> {
    /// Applies the state transition f to the prior mean.
    fn predict(&self, x: &DVector<T>) -> DVector<T>;

    /// Returns the Jacobian Fx (n x n) of the transition evaluated at `x`.
    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>>;

    /// Returns the noise coupling matrix G (n x q).
    fn noise_coupling(&self) -> &DMatrix<T>;

    /// Returns the diagonal process noise variances q (length q).
    fn noise_variance(&self) -> &DVector<T>;
}

fn check_noise_shape<T: RealField>(
    state_size: usize,
    g: &DMatrix<T>,
    q: &DVector<T>,
) -> Result<()> {
    if g.nrows() != state_size || g.ncols() != q.len() {
        return Err(FilterError::Logic(
            "Noise coupling does not match state and noise dimensions",
        ));
    }
    Ok(())
}

// ============================================================================
// Linear Prediction
// ============================================================================

/// Linear prediction model: f(x) = Fx * x.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearPredictModel<T: RealField> {
    fx: DMatrix<T>,
    g: DMatrix<T>,
    q: DVector<T>,
}

impl<T: RealField + Copy> LinearPredictModel<T> {
    /// Creates a linear prediction model.
    ///
    /// # Arguments
    /// - `fx`: State transition matrix (n x n)
    /// - `g`: Noise coupling (n x q)
    /// - `q`: Noise variances (length q)
    pub fn new(fx: DMatrix<T>, g: DMatrix<T>, q: DVector<T>) -> Result<Self> {
        if !fx.is_square() {
            return Err(FilterError::Logic("State transition matrix must be square"));
        }
        check_noise_shape(fx.nrows(), &g, &q)?;
        Ok(Self { fx, g, q })
    }

    /// Returns the state transition matrix.
    #[inline]
    pub fn transition_matrix(&self) -> &DMatrix<T> {
        &self.fx
    }
}

impl<T: RealField + Copy> LinrzPredictModel<T> for LinearPredictModel<T> {
    fn predict(&self, x: &DVector<T>) -> DVector<T> {
        &self.fx * x
    }

    fn jacobian(&self, _x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        Cow::Borrowed(&self.fx)
    }

    fn noise_coupling(&self) -> &DMatrix<T> {
        &self.g
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.q
    }
}

// ============================================================================
// Nonlinear Prediction
// ============================================================================

/// Nonlinear prediction model built from closures.
///
/// `transition` computes f(x) and `jacobian` computes Fx at the prior mean.
pub struct NonlinearPredictModel<T: RealField, F, J> {
    transition: F,
    jacobian: J,
    g: DMatrix<T>,
    q: DVector<T>,
}

impl<T, F, J> NonlinearPredictModel<T, F, J>
where
    T: RealField + Copy,
    F: Fn(&DVector<T>) -> DVector<T>,
    J: Fn(&DVector<T>) -> DMatrix<T>,
{
    /// Creates a nonlinear prediction model for a state of dimension `g.nrows()`.
    pub fn new(transition: F, jacobian: J, g: DMatrix<T>, q: DVector<T>) -> Result<Self> {
        check_noise_shape(g.nrows(), &g, &q)?;
        Ok(Self {
            transition,
            jacobian,
            g,
            q,
        })
    }
}

impl<T, F, J> LinrzPredictModel<T> for NonlinearPredictModel<T, F, J>
where
    T: RealField + Copy,
    F: Fn(&DVector<T>) -> DVector<T>,
    J: Fn(&DVector<T>) -> DMatrix<T>,
{
    fn predict(&self, x: &DVector<T>) -> DVector<T> {
        (self.transition)(x)
    }

    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        Cow::Owned((self.jacobian)(x))
    }

    fn noise_coupling(&self) -> &DMatrix<T> {
        &self.g
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.q
    }
}

// ============================================================================
// Integrated Ornstein-Uhlenbeck Process
// ============================================================================

/// Position / velocity model driven by an Integrated Ornstein-Uhlenbeck process.
///
/// State: [position, velocity]
///
/// Velocity is Brownian with a decay towards zero at rate `v_gamma`, position
/// is integrated velocity. Noise enters the velocity only.
///
/// The matrices are built once from the parameters, which are therefore
/// read-only; use [`with_time_step`](Self::with_time_step) for a new `dt`.
///
/// # Reference
///
/// Stone, L. D., Barlow, C. A., & Corwin, T. L. (1999). "Bayesian Multiple
/// Target Tracking." Artech House.
#[derive(Debug, Clone)]
pub struct IntegratedOrnsteinUhlenbeck<T: RealField> {
    dt: T,
    v_noise: T,
    v_gamma: T,
    linear: LinearPredictModel<T>,
}

impl<T: RealField + Float + Copy> IntegratedOrnsteinUhlenbeck<T> {
    /// Creates an IOU position / velocity model.
    ///
    /// # Panics
    /// Panics if any parameter is negative.
    pub fn new(dt: T, v_noise: T, v_gamma: T) -> Self {
        assert!(dt >= T::zero(), "Time step dt must be non-negative");
        assert!(v_noise >= T::zero(), "Velocity noise must be non-negative");
        assert!(v_gamma >= T::zero(), "Velocity correlation must be non-negative");

        let zero = T::zero();
        let one = T::one();
        let f_vv = Float::exp(-dt * v_gamma);

        let fx = nalgebra::dmatrix![
            one, dt;
            zero, f_vv
        ];
        let g = nalgebra::dmatrix![
            zero;
            one
        ];
        let sigma = (one - f_vv) * v_noise;
        let q = nalgebra::dvector![dt * sigma * sigma];

        Self {
            dt,
            v_noise,
            v_gamma,
            linear: LinearPredictModel { fx, g, q },
        }
    }

    /// Same noise and correlation over a different time step.
    pub fn with_time_step(&self, dt: T) -> Self {
        Self::new(dt, self.v_noise, self.v_gamma)
    }

    /// Time step
    #[inline]
    pub fn dt(&self) -> T {
        self.dt
    }

    /// Velocity noise, bounding the mean squared speed
    #[inline]
    pub fn v_noise(&self) -> T {
        self.v_noise
    }

    /// Velocity correlation rate (inverse time constant)
    #[inline]
    pub fn v_gamma(&self) -> T {
        self.v_gamma
    }

    /// Returns the state transition matrix.
    #[inline]
    pub fn transition_matrix(&self) -> &DMatrix<T> {
        self.linear.transition_matrix()
    }
}

impl<T: RealField + Float + Copy> LinrzPredictModel<T> for IntegratedOrnsteinUhlenbeck<T> {
    fn predict(&self, x: &DVector<T>) -> DVector<T> {
        self.linear.predict(x)
    }

    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        self.linear.jacobian(x)
    }

    fn noise_coupling(&self) -> &DMatrix<T> {
        self.linear.noise_coupling()
    }

    fn noise_variance(&self) -> &DVector<T> {
        self.linear.noise_variance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_linear_predict() {
        let model = LinearPredictModel::new(
            dmatrix![1.0, 2.0; 0.0, 1.0],
            dmatrix![0.0; 1.0],
            dvector![0.5],
        )
        .unwrap();

        let x = dvector![1.0, 3.0];
        let predicted = model.predict(&x);
        assert!((predicted[0] - 7.0).abs() < 1e-12);
        assert!((predicted[1] - 3.0).abs() < 1e-12);
        assert!(matches!(model.jacobian(&x), Cow::Borrowed(_)));
    }

    #[test]
    fn test_linear_shape_checks() {
        let not_square = LinearPredictModel::new(
            DMatrix::<f64>::zeros(2, 3),
            DMatrix::zeros(2, 1),
            dvector![1.0],
        );
        assert!(matches!(not_square, Err(FilterError::Logic(_))));

        let bad_coupling = LinearPredictModel::new(
            DMatrix::<f64>::identity(2, 2),
            DMatrix::zeros(2, 2),
            dvector![1.0],
        );
        assert!(matches!(bad_coupling, Err(FilterError::Logic(_))));
    }

    #[test]
    fn test_nonlinear_predict() {
        let model = NonlinearPredictModel::new(
            |x: &DVector<f64>| dvector![x[0] * x[0]],
            |x: &DVector<f64>| dmatrix![2.0 * x[0]],
            dmatrix![1.0],
            dvector![0.1],
        )
        .unwrap();

        let x = dvector![3.0];
        assert!((model.predict(&x)[0] - 9.0).abs() < 1e-12);
        assert!((model.jacobian(&x)[(0, 0)] - 6.0).abs() < 1e-12);
        assert_eq!(model.noise_variance().len(), 1);
    }

    #[test]
    fn test_iou_model() {
        let model = IntegratedOrnsteinUhlenbeck::new(0.01, 0.1, 1.0);
        let fx = model.transition_matrix();
        let f_vv = (-0.01_f64).exp();

        assert_eq!(fx[(0, 0)], 1.0);
        assert!((fx[(0, 1)] - 0.01).abs() < 1e-15);
        assert_eq!(fx[(1, 0)], 0.0);
        assert!((fx[(1, 1)] - f_vv).abs() < 1e-15);

        let expected_q = 0.01 * ((1.0 - f_vv) * 0.1).powi(2);
        assert!((model.noise_variance()[0] - expected_q).abs() < 1e-20);
        assert_eq!(model.noise_coupling()[(0, 0)], 0.0);
        assert_eq!(model.noise_coupling()[(1, 0)], 1.0);
    }

    #[test]
    fn test_iou_zero_correlation_is_constant_velocity() {
        let model = IntegratedOrnsteinUhlenbeck::new(0.5, 1.0, 0.0);
        let predicted = model.predict(&dvector![10.0, 2.0]);
        assert!((predicted[0] - 11.0).abs() < 1e-12);
        assert!((predicted[1] - 2.0).abs() < 1e-12);
        assert_eq!(model.noise_variance()[0], 0.0);
    }

    #[test]
    fn test_iou_time_step_rebuilds_matrices() {
        let model = IntegratedOrnsteinUhlenbeck::new(0.01_f64, 0.1, 1.0);
        let stepped = model.with_time_step(1.0);

        assert_eq!(stepped.dt(), 1.0);
        assert_eq!(stepped.v_noise(), model.v_noise());
        assert_eq!(stepped.v_gamma(), model.v_gamma());
        assert_eq!(model.dt(), 0.01);

        // Prediction follows the new step, not the one the model was built with
        let predicted = stepped.predict(&dvector![0.0, 1.0]);
        assert!((predicted[0] - 1.0).abs() < 1e-12);
        assert!((predicted[1] - (-1.0_f64).exp()).abs() < 1e-12);
        assert!((model.predict(&dvector![0.0, 1.0])[0] - 0.01).abs() < 1e-12);

        let f_vv = (-1.0_f64).exp();
        let expected_q = ((1.0 - f_vv) * 0.1).powi(2);
        assert!((stepped.noise_variance()[0] - expected_q).abs() < 1e-18);
    }

    #[test]
    #[should_panic]
    fn test_iou_negative_dt_panics() {
        let _ = IntegratedOrnsteinUhlenbeck::new(-0.1, 1.0, 1.0);
    }
}
