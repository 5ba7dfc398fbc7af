//! Observation (sensor) models
//!
//! Describes how measurements relate to the state. Each trait is the
//! capability set one observe algorithm of the UD filter needs; a concrete
//! sensor may implement several of them.

use alloc::borrow::Cow;

use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::{FilterError, Result};

/// Behaviour shared by all observation models.
pub trait ObserveModel<T: RealField> {
    /// Normalises the measurement `z` relative to the prediction `zp`.
    ///
    /// Called before the innovation `z - zp` is formed so periodic
    /// quantities such as angles can be wrapped. The default does nothing.
    fn normalise(&self, _z: &mut DVector<T>, _zp: &DVector<T>) {}
}

/// Linearizable observation model with uncorrelated noise.
///
/// z = h(x) + v, with v having independent components of variance Zv.
pub trait LinrzUncorrelatedObserveModel<T: RealField>: ObserveModel<T> {
    /// Predicted measurement h(x).
    fn observe(&self, x: &DVector<T>) -> DVector<T>;

    /// Jacobian Hx (z x n) of h evaluated at `x`.
    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>>;

    /// Noise variance of each measurement component (all non-negative).
    fn noise_variance(&self) -> &DVector<T>;
}

/// Linearizable observation model with correlated noise.
///
/// Decorrelating the noise requires a linear model, so factorized filters
/// reject this capability set.
pub trait LinrzCorrelatedObserveModel<T: RealField>: ObserveModel<T> {
    /// Predicted measurement h(x).
    fn observe(&self, x: &DVector<T>) -> DVector<T>;

    /// Jacobian Hx (z x n) of h evaluated at `x`.
    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>>;

    /// Full noise covariance Z (z x z).
    fn noise_covariance(&self) -> &DMatrix<T>;
}

/// Linear observation model with correlated noise.
///
/// z = Hx * x + v, with v of full covariance Z.
pub trait LinearCorrelatedObserveModel<T: RealField>: ObserveModel<T> {
    /// Observation matrix Hx (z x n).
    fn observation_matrix(&self) -> &DMatrix<T>;

    /// Full noise covariance Z (z x z).
    fn noise_covariance(&self) -> &DMatrix<T>;

    /// Predicted measurement, Hx * x unless the model adds an offset.
    fn observe(&self, x: &DVector<T>) -> DVector<T> {
        self.observation_matrix() * x
    }
}

/// Uncorrelated observation model evaluated one component at a time.
///
/// Sequential updates change the state after every component, so a model
/// evaluated for the whole measurement at once would be stale for all but
/// the first. This capability lets a sensor compute only what is needed.
pub trait SequentialObserveModel<T: RealField>: ObserveModel<T> {
    /// Dimension of the state the coefficient rows are written for.
    fn state_size(&self) -> usize;

    /// Computes component `index` of the predicted measurement into `zp[index]`
    /// and its coefficient row (row `index` of Hx) into `coefficients`.
    ///
    /// `coefficients` has [`state_size`](Self::state_size) elements; the filter
    /// clears it before each call. Other elements of `zp` are left unspecified.
    fn observe_component(
        &self,
        x: &DVector<T>,
        index: usize,
        zp: &mut DVector<T>,
        coefficients: &mut DVector<T>,
    );

    /// Noise variance of each measurement component (all non-negative).
    fn noise_variance(&self) -> &DVector<T>;
}

/// Wraps an angle into (-pi, pi].
pub fn wrap_angle<T: RealField + Float + Copy>(angle: T) -> T {
    let pi = T::pi();
    let two_pi = T::two_pi();
    let wrapped = angle - two_pi * Float::floor((angle + pi) / two_pi);
    if wrapped <= -pi {
        wrapped + two_pi
    } else {
        wrapped
    }
}

// ============================================================================
// Linear Uncorrelated Observation
// ============================================================================

/// Linear observation with independent noise components: h(x) = Hx * x.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearUncorrelatedObserveModel<T: RealField> {
    hx: DMatrix<T>,
    zv: DVector<T>,
}

impl<T: RealField + Copy> LinearUncorrelatedObserveModel<T> {
    /// Creates a linear uncorrelated observation model.
    ///
    /// # Arguments
    /// - `hx`: Observation matrix (z x n)
    /// - `zv`: Noise variance per component (length z)
    pub fn new(hx: DMatrix<T>, zv: DVector<T>) -> Result<Self> {
        if hx.nrows() != zv.len() {
            return Err(FilterError::Logic(
                "Observation noise does not match observation dimension",
            ));
        }
        Ok(Self { hx, zv })
    }

    /// Returns the observation matrix.
    #[inline]
    pub fn observation_matrix(&self) -> &DMatrix<T> {
        &self.hx
    }
}

impl<T: RealField + Copy> ObserveModel<T> for LinearUncorrelatedObserveModel<T> {}

impl<T: RealField + Copy> LinrzUncorrelatedObserveModel<T> for LinearUncorrelatedObserveModel<T> {
    fn observe(&self, x: &DVector<T>) -> DVector<T> {
        &self.hx * x
    }

    fn jacobian(&self, _x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        Cow::Borrowed(&self.hx)
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.zv
    }
}

impl<T: RealField + Copy> SequentialObserveModel<T> for LinearUncorrelatedObserveModel<T> {
    fn state_size(&self) -> usize {
        self.hx.ncols()
    }

    fn observe_component(
        &self,
        x: &DVector<T>,
        index: usize,
        zp: &mut DVector<T>,
        coefficients: &mut DVector<T>,
    ) {
        let row = self.hx.row(index);
        zp[index] = row.tr_dot(x);
        coefficients.tr_copy_from(&row);
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.zv
    }
}

// ============================================================================
// Linear Correlated Observation
// ============================================================================

/// Linear observation with a full noise covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCorrelatedObserver<T: RealField> {
    hx: DMatrix<T>,
    z: DMatrix<T>,
}

impl<T: RealField + Copy> LinearCorrelatedObserver<T> {
    /// Creates a linear correlated observation model.
    ///
    /// # Arguments
    /// - `hx`: Observation matrix (z x n)
    /// - `z`: Noise covariance (z x z)
    pub fn new(hx: DMatrix<T>, z: DMatrix<T>) -> Result<Self> {
        if z.nrows() != hx.nrows() || z.ncols() != hx.nrows() {
            return Err(FilterError::Logic(
                "Observation noise does not match observation dimension",
            ));
        }
        Ok(Self { hx, z })
    }

    /// Builds the equivalent correlated model, Z = diag(Zv).
    pub fn from_uncorrelated(uncorrelated: &LinearUncorrelatedObserveModel<T>) -> Self {
        Self {
            hx: uncorrelated.hx.clone(),
            z: DMatrix::from_diagonal(&uncorrelated.zv),
        }
    }
}

impl<T: RealField + Copy> ObserveModel<T> for LinearCorrelatedObserver<T> {}

impl<T: RealField + Copy> LinearCorrelatedObserveModel<T> for LinearCorrelatedObserver<T> {
    fn observation_matrix(&self) -> &DMatrix<T> {
        &self.hx
    }

    fn noise_covariance(&self) -> &DMatrix<T> {
        &self.z
    }
}

// ============================================================================
// Range Bearing Sensor
// ============================================================================

/// Range and bearing sensor observing the first two state components.
///
/// Observes [range, bearing] of position (x[0], x[1]) relative to a fixed
/// sensor. The state may carry any number of further components. Bearing
/// residuals are wrapped so a target near +-pi does not produce a 2*pi jump.
#[derive(Debug, Clone)]
pub struct RangeBearingSensor<T: RealField> {
    /// Sensor x position
    pub sensor_x: T,
    /// Sensor y position
    pub sensor_y: T,
    state_size: usize,
    zv: DVector<T>,
    z: DMatrix<T>,
}

impl<T: RealField + Float + Copy> RangeBearingSensor<T> {
    /// Creates a range bearing sensor at the origin.
    ///
    /// # Arguments
    /// - `state_size`: Dimension of the observed state (at least 2)
    /// - `sigma_range`: Range noise standard deviation
    /// - `sigma_bearing`: Bearing noise standard deviation (radians)
    ///
    /// # Panics
    /// Panics if `state_size < 2` or a noise deviation is negative.
    pub fn new(state_size: usize, sigma_range: T, sigma_bearing: T) -> Self {
        Self::at_position(state_size, sigma_range, sigma_bearing, T::zero(), T::zero())
    }

    /// Creates a range bearing sensor at a given position.
    pub fn at_position(
        state_size: usize,
        sigma_range: T,
        sigma_bearing: T,
        sensor_x: T,
        sensor_y: T,
    ) -> Self {
        assert!(state_size >= 2, "Range bearing sensor needs a 2D position");
        assert!(sigma_range >= T::zero(), "Range noise must be non-negative");
        assert!(sigma_bearing >= T::zero(), "Bearing noise must be non-negative");

        let zv = nalgebra::dvector![sigma_range * sigma_range, sigma_bearing * sigma_bearing];
        let z = DMatrix::from_diagonal(&zv);
        Self {
            sensor_x,
            sensor_y,
            state_size,
            zv,
            z,
        }
    }

    fn offset(&self, x: &DVector<T>) -> (T, T) {
        (x[0] - self.sensor_x, x[1] - self.sensor_y)
    }

    fn range_bearing(&self, x: &DVector<T>) -> (T, T) {
        let (dx, dy) = self.offset(x);
        (Float::sqrt(dx * dx + dy * dy), Float::atan2(dy, dx))
    }

    /// Row `index` of the Jacobian with respect to position, `(d/dx0, d/dx1)`.
    ///
    /// The Jacobian is undefined at the sensor position; a zero row is
    /// produced there so the component carries no information.
    fn position_gradient(&self, x: &DVector<T>, index: usize) -> (T, T) {
        let (dx, dy) = self.offset(x);
        let r_sq = dx * dx + dy * dy;
        let r = Float::sqrt(r_sq);
        let tiny: T = nalgebra::convert(1e-10);

        if r < tiny {
            (T::zero(), T::zero())
        } else if index == 0 {
            (dx / r, dy / r)
        } else {
            (-dy / r_sq, dx / r_sq)
        }
    }

    fn full_jacobian(&self, x: &DVector<T>) -> DMatrix<T> {
        let mut hx = DMatrix::zeros(2, self.state_size);
        for index in 0..2 {
            let (d0, d1) = self.position_gradient(x, index);
            hx[(index, 0)] = d0;
            hx[(index, 1)] = d1;
        }
        hx
    }
}

impl<T: RealField + Float + Copy> ObserveModel<T> for RangeBearingSensor<T> {
    fn normalise(&self, z: &mut DVector<T>, zp: &DVector<T>) {
        z[1] = zp[1] + wrap_angle(z[1] - zp[1]);
    }
}

impl<T: RealField + Float + Copy> LinrzUncorrelatedObserveModel<T> for RangeBearingSensor<T> {
    fn observe(&self, x: &DVector<T>) -> DVector<T> {
        let (range, bearing) = self.range_bearing(x);
        nalgebra::dvector![range, bearing]
    }

    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        Cow::Owned(self.full_jacobian(x))
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.zv
    }
}

impl<T: RealField + Float + Copy> LinrzCorrelatedObserveModel<T> for RangeBearingSensor<T> {
    fn observe(&self, x: &DVector<T>) -> DVector<T> {
        let (range, bearing) = self.range_bearing(x);
        nalgebra::dvector![range, bearing]
    }

    fn jacobian(&self, x: &DVector<T>) -> Cow<'_, DMatrix<T>> {
        Cow::Owned(self.full_jacobian(x))
    }

    fn noise_covariance(&self) -> &DMatrix<T> {
        &self.z
    }
}

impl<T: RealField + Float + Copy> SequentialObserveModel<T> for RangeBearingSensor<T> {
    fn state_size(&self) -> usize {
        self.state_size
    }

    fn observe_component(
        &self,
        x: &DVector<T>,
        index: usize,
        zp: &mut DVector<T>,
        coefficients: &mut DVector<T>,
    ) {
        let (dx, dy) = self.offset(x);
        zp[index] = if index == 0 {
            Float::sqrt(dx * dx + dy * dy)
        } else {
            Float::atan2(dy, dx)
        };
        let (d0, d1) = self.position_gradient(x, index);
        coefficients.fill(T::zero());
        if coefficients.len() >= 2 {
            coefficients[0] = d0;
            coefficients[1] = d1;
        }
    }

    fn noise_variance(&self) -> &DVector<T> {
        &self.zv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::PI;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(0.5_f64) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(2.0 * PI + 0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_angle(-2.0 * PI - 0.1) + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_linear_uncorrelated() {
        let model =
            LinearUncorrelatedObserveModel::new(dmatrix![1.0, 0.0; 0.0, 2.0], dvector![0.1, 0.2])
                .unwrap();
        let x = dvector![3.0, 4.0];

        let zp = LinrzUncorrelatedObserveModel::observe(&model, &x);
        assert_eq!(zp, dvector![3.0, 8.0]);

        let mut component = DVector::zeros(2);
        let mut row = DVector::zeros(2);
        model.observe_component(&x, 1, &mut component, &mut row);
        assert_eq!(component[1], 8.0);
        assert_eq!(row, dvector![0.0, 2.0]);
    }

    #[test]
    fn test_linear_uncorrelated_shape_check() {
        let result =
            LinearUncorrelatedObserveModel::new(DMatrix::<f64>::zeros(2, 3), dvector![1.0]);
        assert!(matches!(result, Err(FilterError::Logic(_))));
    }

    #[test]
    fn test_correlated_from_uncorrelated() {
        let uncorrelated =
            LinearUncorrelatedObserveModel::new(dmatrix![1.0, 0.0; 0.0, 1.0], dvector![0.5, 2.0])
                .unwrap();
        let correlated = LinearCorrelatedObserver::from_uncorrelated(&uncorrelated);

        assert_eq!(correlated.noise_covariance(), &dmatrix![0.5, 0.0; 0.0, 2.0]);
        assert_eq!(correlated.observe(&dvector![1.0, 2.0]), dvector![1.0, 2.0]);
    }

    #[test]
    fn test_range_bearing() {
        let sensor = RangeBearingSensor::at_position(4, 1.0, 0.01, 1.0, 1.0);
        let x = dvector![4.0, 5.0, 0.0, 0.0];

        let zp = LinrzUncorrelatedObserveModel::observe(&sensor, &x);
        assert!((zp[0] - 5.0).abs() < 1e-12);
        assert!((zp[1] - (4.0_f64).atan2(3.0)).abs() < 1e-12);

        let hx = LinrzUncorrelatedObserveModel::jacobian(&sensor, &x);
        assert_eq!(hx.shape(), (2, 4));
        assert!((hx[(0, 0)] - 0.6).abs() < 1e-12);
        assert!((hx[(0, 1)] - 0.8).abs() < 1e-12);
        assert!((hx[(1, 0)] + 4.0 / 25.0).abs() < 1e-12);
        assert!((hx[(1, 1)] - 3.0 / 25.0).abs() < 1e-12);
        assert_eq!(hx[(0, 3)], 0.0);

        // Component evaluation agrees with the full model
        let mut component = DVector::zeros(2);
        let mut row = DVector::from_element(4, 7.0);
        sensor.observe_component(&x, 1, &mut component, &mut row);
        assert_eq!(sensor.state_size(), 4);
        assert!((component[1] - zp[1]).abs() < 1e-12);
        assert!((row[0] - hx[(1, 0)]).abs() < 1e-12);
        assert!((row[1] - hx[(1, 1)]).abs() < 1e-12);
        // Coefficients beyond the position are overwritten, not kept
        assert_eq!(row[2], 0.0);
        assert_eq!(row[3], 0.0);
    }

    #[test]
    fn test_range_bearing_at_sensor() {
        let sensor = RangeBearingSensor::new(2, 1.0, 0.01);
        let hx = LinrzUncorrelatedObserveModel::jacobian(&sensor, &dvector![0.0, 0.0]);
        assert_eq!(hx.into_owned(), DMatrix::zeros(2, 2));
    }

    #[test]
    fn test_bearing_normalise() {
        let sensor = RangeBearingSensor::new(2, 1.0, 0.01);

        // Prediction just below +pi, measurement just above -pi
        let zp = dvector![10.0, PI - 0.05];
        let mut z = dvector![10.0, -PI + 0.05];
        sensor.normalise(&mut z, &zp);

        assert!((z[1] - zp[1] - 0.1).abs() < 1e-12);
        assert_eq!(z[0], 10.0);
    }
}
